use nalgebra::Vector3;
use ndarray::Zip;
use rayon::prelude::*;

use crate::{
    camera::CameraIntrinsics,
    error::F3dError,
    frame::DepthFrame,
    image::DepthMap,
    transform::Transform,
    volume::{PassKind, VolumeConfig, VoxelGrid},
};

pub struct FusionParameters {
    /// Weight given to each frame's observation of a voxel.
    pub frame_weight: f32,
    /// Depth samples farther than this are treated as invalid.
    pub max_depth: Option<f32>,
}

impl Default for FusionParameters {
    fn default() -> Self {
        FusionParameters {
            frame_weight: 1.0,
            max_depth: None,
        }
    }
}

impl FusionParameters {
    pub fn from_config(config: &VolumeConfig) -> Self {
        FusionParameters {
            frame_weight: config.frame_weight,
            max_depth: config.max_depth,
        }
    }

    /// Fails on a non-positive or non-finite frame weight, or a non-positive maximum depth.
    pub fn validate(&self) -> Result<(), F3dError> {
        if !(self.frame_weight.is_finite() && self.frame_weight > 0.0) {
            return Err(F3dError::configuration(format!(
                "frame weight must be positive, got {}",
                self.frame_weight
            )));
        }
        if let Some(max_depth) = self.max_depth {
            if !(max_depth > 0.0) {
                return Err(F3dError::configuration(format!(
                    "maximum depth must be positive, got {}",
                    max_depth
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionSummary {
    pub num_updated: usize,
    pub num_rejected: usize,
}

/// Per-frame constants of the integration kernel.
pub(crate) struct FusionKernel<'a> {
    volume_to_camera: Transform,
    intrinsics: &'a CameraIntrinsics,
    depth: &'a DepthMap,
    voxel_size: f32,
    truncation_distance: f32,
    frame_weight: f32,
    max_depth: f32,
}

impl<'a> FusionKernel<'a> {
    pub(crate) fn new(grid: &VoxelGrid, frame: &'a DepthFrame, params: &FusionParameters) -> Self {
        let camera = frame.pinhole_camera();
        FusionKernel {
            volume_to_camera: camera.world_to_camera() * grid.volume_to_world(),
            intrinsics: &frame.intrinsics,
            depth: &frame.depth,
            voxel_size: grid.voxel_size(),
            truncation_distance: grid.truncation_distance(),
            frame_weight: params.frame_weight,
            max_depth: params.max_depth.unwrap_or(f32::INFINITY),
        }
    }

    /// Normalized signed distance that this frame observes for a voxel, or `None`
    /// when the voxel is behind the camera, projects outside the depth map, or
    /// lands on an invalid depth sample.
    pub(crate) fn observe(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        let position = Vector3::new(x as f32, y as f32, z as f32) * self.voxel_size;
        let camera_point = self.volume_to_camera.transform_point(&position);
        if camera_point[2] <= 0.0 {
            return None;
        }

        let (px, py) = self.intrinsics.project(&camera_point);
        let u = (px + 0.5) / self.depth.width() as f32;
        let v = (py + 0.5) / self.depth.height() as f32;
        if !((0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v)) {
            return None;
        }

        let depth = self.depth.sample_uv(u, v);
        if !(depth > 0.0 && depth <= self.max_depth) {
            return None;
        }

        let sdf = num::clamp(
            depth - camera_point[2],
            -self.truncation_distance,
            self.truncation_distance,
        );
        Some(sdf / self.truncation_distance)
    }

    /// Merges the observation into the voxel's running weighted mean.
    /// Returns whether the voxel was updated.
    pub(crate) fn integrate_voxel(
        &self,
        (x, y, z): (usize, usize, usize),
        tsdf: &mut f32,
        weight: &mut f32,
    ) -> bool {
        match self.observe(x, y, z) {
            Some(tsdf_new) => {
                let fused_weight = *weight + self.frame_weight;
                *tsdf = (*tsdf * *weight + tsdf_new * self.frame_weight) / fused_weight;
                *weight = fused_weight;
                true
            }
            None => false,
        }
    }
}

/// Projective TSDF integration of depth frames into a [`VoxelGrid`].
#[derive(Default)]
pub struct TsdfFusion {
    params: FusionParameters,
}

impl TsdfFusion {
    pub fn new(params: FusionParameters) -> Self {
        TsdfFusion { params }
    }

    pub fn params(&self) -> &FusionParameters {
        &self.params
    }

    /// Integrates one frame. Each voxel is updated independently, in parallel; the call
    /// returns once every voxel write is done.
    ///
    /// # Arguments
    ///
    /// * `grid` - The volume, updated in place.
    /// * `frame` - Depth, intrinsics and camera pose of the capture.
    ///
    /// # Returns
    ///
    /// How many voxels were updated and how many were rejected. Fails before touching
    /// the grid if the parameters or the frame are malformed, or another pass holds the grid.
    pub fn integrate(
        &self,
        grid: &mut VoxelGrid,
        frame: &DepthFrame,
    ) -> Result<FusionSummary, F3dError> {
        self.params.validate()?;
        frame.validate()?;
        let _pass = grid.begin_pass(PassKind::Fusion)?;

        let kernel = FusionKernel::new(grid, frame, &self.params);
        let num_voxels = grid.num_voxels();
        let (tsdf, weight) = grid.arrays_mut();

        let num_updated: usize = Zip::indexed(tsdf)
            .and(weight)
            .into_par_iter()
            .map(|((z, y, x), tsdf, weight)| {
                kernel.integrate_voxel((x, y, z), tsdf, weight) as usize
            })
            .sum();

        let summary = FusionSummary {
            num_updated,
            num_rejected: num_voxels - num_updated,
        };
        log::debug!(
            "Fused {}x{} frame: {} voxels updated, {} rejected",
            frame.width(),
            frame.height(),
            summary.num_updated,
            summary.num_rejected
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use itertools::iproduct;
    use ndarray::Array2;
    use rstest::rstest;

    use super::*;
    use crate::unit_test::{plane_frame, sphere_frames, PlaneScene, SphereScene};

    fn fresh_grid(scene: &PlaneScene) -> VoxelGrid {
        VoxelGrid::new(&scene.config).unwrap()
    }

    #[rstest]
    fn test_single_frame_matches_projection(plane_frame: (DepthFrame, PlaneScene)) {
        let (frame, scene) = plane_frame;
        let mut grid = fresh_grid(&scene);
        let summary = TsdfFusion::default().integrate(&mut grid, &frame).unwrap();
        assert!(summary.num_updated > 0);
        assert!(summary.num_rejected > 0);
        assert_eq!(summary.num_updated + summary.num_rejected, grid.num_voxels());

        let world_to_camera = frame.camera_to_world.inverse();
        let truncation = grid.truncation_distance();
        let [nx, ny, nz] = grid.dimensions();
        let mut num_valid = 0;
        for (x, y, z) in iproduct!(0..nx, 0..ny, 0..nz) {
            let camera_point = &world_to_camera * &grid.voxel_world_position(x, y, z);
            let (px, py) = frame.intrinsics.project(&camera_point);
            let inside_footprint = camera_point[2] > 0.0
                && px >= -0.5
                && px <= frame.width() as f32 - 0.5
                && py >= -0.5
                && py <= frame.height() as f32 - 0.5;
            // Skip voxels sitting on the footprint border, where rounding decides.
            if (px + 0.5).abs() < 1e-3
                || (px - frame.width() as f32 + 0.5).abs() < 1e-3
                || (py + 0.5).abs() < 1e-3
                || (py - frame.height() as f32 + 0.5).abs() < 1e-3
            {
                continue;
            }

            if inside_footprint {
                num_valid += 1;
                let sdf = num::clamp(scene.depth - camera_point[2], -truncation, truncation);
                assert_relative_eq!(grid.tsdf_at(x, y, z), sdf / truncation, epsilon = 1e-4);
                assert_eq!(grid.weight_at(x, y, z), 1.0);
            } else {
                assert_eq!(grid.tsdf_at(x, y, z), 0.0);
                assert_eq!(grid.weight_at(x, y, z), 0.0);
            }
        }
        assert!(num_valid > 0);
    }

    #[rstest]
    fn test_weight_monotonicity_and_range(sphere_frames: (Vec<DepthFrame>, SphereScene)) {
        let (frames, scene) = sphere_frames;
        let mut grid = VoxelGrid::new(&scene.config).unwrap();
        let fusion = TsdfFusion::default();

        for frame in frames.iter() {
            let before = grid.clone();
            let summary = fusion.integrate(&mut grid, frame).unwrap();
            let kernel = FusionKernel::new(&before, frame, fusion.params());

            let mut num_updated = 0;
            let [nx, ny, nz] = grid.dimensions();
            for (x, y, z) in iproduct!(0..nx, 0..ny, 0..nz) {
                let (w_before, w_after) = (before.weight_at(x, y, z), grid.weight_at(x, y, z));
                assert!(w_after >= w_before);
                if kernel.observe(x, y, z).is_some() {
                    num_updated += 1;
                    assert_eq!(w_after, w_before + 1.0);
                } else {
                    assert_eq!(w_after, w_before);
                    assert_eq!(grid.tsdf_at(x, y, z), before.tsdf_at(x, y, z));
                }
            }
            assert_eq!(num_updated, summary.num_updated);
            assert!(grid.tsdf().iter().all(|tsdf| (-1.0..=1.0).contains(tsdf)));
        }
    }

    #[rstest]
    fn test_behind_camera_is_rejected(plane_frame: (DepthFrame, PlaneScene)) {
        let (mut frame, scene) = plane_frame;
        // Moving the camera far in front of the volume leaves every voxel behind it.
        frame.camera_to_world = Transform::from_translation(&Vector3::new(0.0, 0.0, 100.0));
        let mut grid = fresh_grid(&scene);
        let summary = TsdfFusion::default().integrate(&mut grid, &frame).unwrap();
        assert_eq!(summary.num_updated, 0);
        assert_eq!(grid.observed_voxels(), 0);
    }

    #[rstest]
    fn test_invalid_depth_is_rejected(plane_frame: (DepthFrame, PlaneScene)) {
        let (mut frame, scene) = plane_frame;
        frame.depth.data.fill(0.0);
        let mut grid = fresh_grid(&scene);
        let summary = TsdfFusion::default().integrate(&mut grid, &frame).unwrap();
        assert_eq!(summary.num_updated, 0);
        assert_eq!(grid.observed_voxels(), 0);
    }

    #[rstest]
    fn test_max_depth(plane_frame: (DepthFrame, PlaneScene)) {
        let (frame, scene) = plane_frame;
        let mut grid = fresh_grid(&scene);
        let fusion = TsdfFusion::new(FusionParameters {
            frame_weight: 1.0,
            max_depth: Some(scene.depth * 0.5),
        });
        let summary = fusion.integrate(&mut grid, &frame).unwrap();
        assert_eq!(summary.num_updated, 0);
    }

    #[rstest]
    fn test_malformed_frame_fails_fast(plane_frame: (DepthFrame, PlaneScene)) {
        let (mut frame, scene) = plane_frame;
        let mut grid = fresh_grid(&scene);

        frame.intrinsics.fx = 0.0;
        assert!(matches!(
            TsdfFusion::default().integrate(&mut grid, &frame),
            Err(F3dError::Configuration(_))
        ));

        frame.intrinsics.fx = 100.0;
        frame.depth.data = Array2::zeros((0, 10));
        assert!(matches!(
            TsdfFusion::default().integrate(&mut grid, &frame),
            Err(F3dError::Configuration(_))
        ));
        assert_eq!(grid.observed_voxels(), 0);
    }

    #[rstest]
    fn test_fusion_during_extraction(plane_frame: (DepthFrame, PlaneScene)) {
        let (frame, scene) = plane_frame;
        let mut grid = fresh_grid(&scene);
        let extraction = grid.begin_pass(PassKind::Extraction).unwrap();
        assert!(matches!(
            TsdfFusion::default().integrate(&mut grid, &frame),
            Err(F3dError::ConcurrencyViolation(_))
        ));
        drop(extraction);
        assert!(TsdfFusion::default().integrate(&mut grid, &frame).is_ok());
    }

    #[rstest]
    fn test_running_average(plane_frame: (DepthFrame, PlaneScene)) {
        let (frame, scene) = plane_frame;
        let mut near_frame = frame.clone();
        near_frame.depth.data.fill(scene.depth - 0.01);

        let mut grid = fresh_grid(&scene);
        let fusion = TsdfFusion::default();
        fusion.integrate(&mut grid, &frame).unwrap();
        let first = grid.clone();
        fusion.integrate(&mut grid, &near_frame).unwrap();

        let kernel = FusionKernel::new(&first, &near_frame, fusion.params());
        let [nx, ny, nz] = grid.dimensions();
        for (x, y, z) in iproduct!(0..nx, 0..ny, 0..nz) {
            if let Some(observed) = kernel.observe(x, y, z) {
                let w_old = first.weight_at(x, y, z);
                let expected = (first.tsdf_at(x, y, z) * w_old + observed) / (w_old + 1.0);
                assert_relative_eq!(grid.tsdf_at(x, y, z), expected, epsilon = 1e-6);
            }
        }
    }

    #[rstest]
    fn test_non_cubic_grid_layout(plane_frame: (DepthFrame, PlaneScene)) {
        let (frame, _) = plane_frame;
        let config = VolumeConfig::new([4, 6, 8], 0.02, 0.06);
        let mut grid = VoxelGrid::new(&config).unwrap();
        let fusion = TsdfFusion::default();
        let summary = fusion.integrate(&mut grid, &frame).unwrap();
        assert!(summary.num_updated > 0);

        let kernel = FusionKernel::new(&VoxelGrid::new(&config).unwrap(), &frame, fusion.params());
        let mut num_updated = 0;
        for (x, y, z) in iproduct!(0..4, 0..6, 0..8) {
            match kernel.observe(x, y, z) {
                Some(observed) => {
                    num_updated += 1;
                    assert_eq!(grid.tsdf_at(x, y, z), observed, "voxel {:?}", (x, y, z));
                    assert_eq!(grid.weight_at(x, y, z), 1.0);
                }
                None => {
                    assert_eq!(grid.tsdf_at(x, y, z), 0.0);
                    assert_eq!(grid.weight_at(x, y, z), 0.0);
                }
            }
        }
        assert_eq!(num_updated, summary.num_updated);
    }

    #[rstest]
    #[case(0.0, None)]
    #[case(-1.0, None)]
    #[case(f32::NAN, None)]
    #[case(1.0, Some(0.0))]
    #[case(1.0, Some(-2.0))]
    fn test_invalid_parameters(
        plane_frame: (DepthFrame, PlaneScene),
        #[case] frame_weight: f32,
        #[case] max_depth: Option<f32>,
    ) {
        let (frame, scene) = plane_frame;
        let mut grid = fresh_grid(&scene);
        let fusion = TsdfFusion::new(FusionParameters {
            frame_weight,
            max_depth,
        });
        assert!(matches!(
            fusion.integrate(&mut grid, &frame),
            Err(F3dError::Configuration(_))
        ));
        assert_eq!(grid.observed_voxels(), 0);
        assert!(grid.tsdf().iter().all(|tsdf| *tsdf == 0.0));
    }
}
