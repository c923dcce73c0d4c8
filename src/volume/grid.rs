use itertools::iproduct;
use nalgebra::Vector3;
use ndarray::{Array3, Zip};

use crate::{bounds::Box3Df, error::F3dError, transform::Transform};

use super::{
    config::VolumeConfig,
    pass::{PassGuard, PassKind, PassState},
};

/// Truncated signed distance volume.
///
/// `tsdf` and `weight` have shape `(nz, ny, nx)` in standard layout, so the flat
/// index of voxel `(x, y, z)` is `z*nx*ny + y*nx + x`. Voxel `(x, y, z)` sits at
/// `volume_to_world * ((x, y, z) * voxel_size)`.
#[derive(Debug)]
pub struct VoxelGrid {
    /// Signed distance normalized by the truncation distance, in `[-1, 1]`.
    tsdf: Array3<f32>,
    /// Accumulated observation weight. Zero means never observed.
    weight: Array3<f32>,
    voxel_size: f32,
    truncation_distance: f32,
    volume_to_world: Transform,
    pass_state: PassState,
}

impl VoxelGrid {
    /// Allocates a zeroed grid.
    pub fn new(config: &VolumeConfig) -> Result<Self, F3dError> {
        config.validate()?;
        let [nx, ny, nz] = config.dimensions;
        Ok(Self {
            tsdf: Array3::zeros((nz, ny, nx)),
            weight: Array3::zeros((nz, ny, nx)),
            voxel_size: config.voxel_size,
            truncation_distance: config.truncation_distance,
            volume_to_world: config.volume_to_world(),
            pass_state: PassState::default(),
        })
    }

    /// Creates a grid sampling a signed distance function of the world position.
    /// Every voxel gets weight 1.
    ///
    /// # Arguments
    ///
    /// * `config` - Volume configuration.
    /// * `sdf` - Signed distance in meters, positive outside the surface.
    pub fn from_sdf<F>(config: &VolumeConfig, sdf: F) -> Result<Self, F3dError>
    where
        F: Fn(&Vector3<f32>) -> f32 + Sync,
    {
        let mut grid = Self::new(config)?;
        let truncation = grid.truncation_distance;
        let voxel_size = grid.voxel_size;
        let volume_to_world = grid.volume_to_world.clone();

        Zip::indexed(&mut grid.tsdf).par_for_each(|(z, y, x), tsdf| {
            let position = volume_to_world
                .transform_point(&(Vector3::new(x as f32, y as f32, z as f32) * voxel_size));
            *tsdf = num::clamp(sdf(&position), -truncation, truncation) / truncation;
        });
        grid.weight.fill(1.0);
        Ok(grid)
    }

    /// Grid dimensions as `[nx, ny, nz]`.
    pub fn dimensions(&self) -> [usize; 3] {
        let (nz, ny, nx) = self.tsdf.dim();
        [nx, ny, nz]
    }

    pub fn num_voxels(&self) -> usize {
        self.tsdf.len()
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn truncation_distance(&self) -> f32 {
        self.truncation_distance
    }

    pub fn volume_to_world(&self) -> &Transform {
        &self.volume_to_world
    }

    pub fn tsdf(&self) -> &Array3<f32> {
        &self.tsdf
    }

    pub fn weight(&self) -> &Array3<f32> {
        &self.weight
    }

    pub fn tsdf_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.tsdf[(z, y, x)]
    }

    pub fn weight_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.weight[(z, y, x)]
    }

    /// Position of a flat index inside `tsdf`/`weight` storage.
    pub fn flat_index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.dimensions();
        z * nx * ny + y * nx + x
    }

    /// Volume-space position of a voxel, before the origin transform.
    pub fn voxel_position(&self, x: usize, y: usize, z: usize) -> Vector3<f32> {
        Vector3::new(x as f32, y as f32, z as f32) * self.voxel_size
    }

    pub fn voxel_world_position(&self, x: usize, y: usize, z: usize) -> Vector3<f32> {
        self.volume_to_world
            .transform_point(&self.voxel_position(x, y, z))
    }

    /// Axis-aligned world box enclosing every voxel position.
    pub fn world_bounds(&self) -> Box3Df {
        let [nx, ny, nz] = self.dimensions();
        let corners = iproduct!([0, nx - 1], [0, ny - 1], [0, nz - 1])
            .map(|(x, y, z)| self.voxel_world_position(x, y, z))
            .collect::<Vec<_>>();
        Box3Df::from_points(corners.iter())
    }

    /// Number of voxels with non-zero weight.
    pub fn observed_voxels(&self) -> usize {
        self.weight.iter().filter(|weight| **weight > 0.0).count()
    }

    /// Marks the start of a pass over this grid. Fails with
    /// [`F3dError::ConcurrencyViolation`] when an incompatible pass holds it.
    pub fn begin_pass(&self, kind: PassKind) -> Result<PassGuard, F3dError> {
        self.pass_state.begin(kind)
    }

    pub fn is_idle(&self) -> bool {
        self.pass_state.is_idle()
    }

    /// Zeroes tsdf and weight. Only valid between passes.
    pub fn reset(&mut self) -> Result<(), F3dError> {
        let _pass = self.begin_pass(PassKind::Reset)?;
        self.tsdf.fill(0.0);
        self.weight.fill(0.0);
        Ok(())
    }

    pub(crate) fn arrays_mut(&mut self) -> (&mut Array3<f32>, &mut Array3<f32>) {
        (&mut self.tsdf, &mut self.weight)
    }
}

impl Clone for VoxelGrid {
    /// Copies the voxel data. The copy starts idle, with its own pass tracking.
    fn clone(&self) -> Self {
        Self {
            tsdf: self.tsdf.clone(),
            weight: self.weight.clone(),
            voxel_size: self.voxel_size,
            truncation_distance: self.truncation_distance,
            volume_to_world: self.volume_to_world.clone(),
            pass_state: PassState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    use crate::unit_test::{sphere_grid, SphereScene};

    #[test]
    fn test_layout() {
        let grid = VoxelGrid::new(&VolumeConfig::new([4, 3, 2], 0.1, 0.3)).unwrap();
        assert_eq!(grid.dimensions(), [4, 3, 2]);
        assert_eq!(grid.num_voxels(), 24);
        assert_eq!(grid.tsdf().len(), grid.weight().len());
        assert_eq!(grid.flat_index(3, 2, 1), 12 + 8 + 3);

        let mut grid = grid;
        grid.arrays_mut().0[(1, 2, 3)] = 0.5;
        let flat = grid.tsdf().as_slice().unwrap();
        assert_eq!(flat[grid.flat_index(3, 2, 1)], 0.5);
        assert_eq!(grid.tsdf_at(3, 2, 1), 0.5);
    }

    #[test]
    fn test_voxel_positions() {
        let grid = VoxelGrid::new(
            &VolumeConfig::new([4, 4, 4], 0.5, 1.0).with_origin([1.0, 0.0, -1.0]),
        )
        .unwrap();
        assert_relative_eq!(grid.voxel_position(1, 2, 3), Vector3::new(0.5, 1.0, 1.5));
        assert_relative_eq!(
            grid.voxel_world_position(1, 2, 3),
            Vector3::new(1.5, 1.0, 0.5)
        );

        let bounds = grid.world_bounds();
        assert_relative_eq!(bounds.min, Vector3::new(1.0, 0.0, -1.0));
        assert_relative_eq!(bounds.max, Vector3::new(2.5, 1.5, 0.5));
    }

    #[rstest]
    fn test_from_sdf(sphere_grid: (VoxelGrid, SphereScene)) {
        let (grid, sphere) = sphere_grid;
        let [nx, ny, nz] = grid.dimensions();
        for (x, y, z) in iproduct!(0..nx, 0..ny, 0..nz) {
            let distance = (grid.voxel_world_position(x, y, z) - sphere.center).norm()
                - sphere.radius;
            let expected = num::clamp(distance, -sphere.truncation, sphere.truncation)
                / sphere.truncation;
            assert_relative_eq!(grid.tsdf_at(x, y, z), expected, epsilon = 1e-5);
            assert_eq!(grid.weight_at(x, y, z), 1.0);
        }
    }

    #[rstest]
    fn test_reset(sphere_grid: (VoxelGrid, SphereScene)) {
        let (mut grid, _) = sphere_grid;
        assert_eq!(grid.observed_voxels(), grid.num_voxels());

        grid.reset().unwrap();
        assert!(grid.tsdf().iter().all(|tsdf| *tsdf == 0.0));
        assert!(grid.weight().iter().all(|weight| *weight == 0.0));

        grid.reset().unwrap();
        assert_eq!(grid.observed_voxels(), 0);
        assert!(grid.is_idle());
    }

    #[test]
    fn test_reset_during_pass() {
        let mut grid = VoxelGrid::new(&VolumeConfig::new([4, 4, 4], 0.1, 0.3)).unwrap();
        let pass = grid.begin_pass(PassKind::Extraction).unwrap();
        assert!(matches!(
            grid.reset(),
            Err(F3dError::ConcurrencyViolation(_))
        ));
        drop(pass);
        assert!(grid.reset().is_ok());
    }

    #[test]
    fn test_clone_has_own_pass_state() {
        let grid = VoxelGrid::new(&VolumeConfig::new([4, 4, 4], 0.1, 0.3)).unwrap();
        let _pass = grid.begin_pass(PassKind::Fusion).unwrap();
        let copy = grid.clone();
        assert!(!grid.is_idle());
        assert!(copy.is_idle());
    }
}
