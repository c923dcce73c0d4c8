use log::{info, warn};

use crate::{
    coverage::CoverageTracker,
    error::F3dError,
    frame::DepthFrame,
    fusion::{FusionParameters, FusionSummary, TsdfFusion},
    marching_cubes::{ExtractionParameters, MarchingCubes},
    mesh::Mesh,
    source::FrameSource,
    volume::{VolumeConfig, VoxelGrid},
};

/// A scanning session: one voxel grid, fused frame by frame and extracted on demand.
///
/// The session owns the grid. Fusion and reset borrow it mutably and extraction
/// borrows it shared, so passes cannot overlap through this API.
pub struct ScanSession {
    config: VolumeConfig,
    grid: VoxelGrid,
    fusion: TsdfFusion,
    extraction: MarchingCubes,
    frames_fused: usize,
}

impl ScanSession {
    pub fn new(config: VolumeConfig) -> Result<Self, F3dError> {
        let grid = VoxelGrid::new(&config)?;
        info!(
            "Allocated {:?} voxel grid, voxel size {} m, truncation {} m",
            config.dimensions, config.voxel_size, config.truncation_distance
        );
        Ok(Self {
            fusion: TsdfFusion::new(FusionParameters::from_config(&config)),
            extraction: MarchingCubes::new(ExtractionParameters::from_config(&config)),
            config,
            grid,
            frames_fused: 0,
        })
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Number of frames integrated since creation or the last reset.
    pub fn frames_fused(&self) -> usize {
        self.frames_fused
    }

    pub fn integrate(&mut self, frame: &DepthFrame) -> Result<FusionSummary, F3dError> {
        let summary = self.fusion.integrate(&mut self.grid, frame)?;
        self.frames_fused += 1;
        if summary.num_updated == 0 {
            warn!(
                "Frame {} did not update any voxel; is the camera looking at the volume?",
                self.frames_fused
            );
        }
        Ok(summary)
    }

    pub fn extract(&self) -> Result<Mesh, F3dError> {
        self.extraction.extract(&self.grid)
    }

    /// Clears the grid for a new scan.
    pub fn reset(&mut self) -> Result<(), F3dError> {
        self.grid.reset()?;
        self.frames_fused = 0;
        Ok(())
    }

    /// Fuses frames from `source` until `coverage` is sufficient or the source runs
    /// out, then extracts the surface.
    pub fn run<S, C>(&mut self, source: &mut S, coverage: &mut C) -> Result<Mesh, F3dError>
    where
        S: FrameSource + ?Sized,
        C: CoverageTracker + ?Sized,
    {
        while !coverage.is_sufficient() {
            let frame = match source.next_frame()? {
                Some(frame) => frame,
                None => {
                    info!("Frame source exhausted after {} frames", self.frames_fused);
                    break;
                }
            };
            let summary = self.integrate(&frame)?;
            coverage.observe(&frame, &summary);
        }

        let mesh = self.extract()?;
        info!(
            "Extracted {} triangles after {} frames",
            mesh.triangle_count(),
            self.frames_fused
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        coverage::{ExhaustSource, FrameCountCoverage},
        source::FrameList,
        unit_test::{sphere_frames, SphereScene},
    };

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ScanSession::new(VolumeConfig::new([16, 16, 16], 0.0, 0.1)),
            Err(F3dError::Configuration(_))
        ));
    }

    #[rstest]
    fn test_run_until_coverage(sphere_frames: (Vec<DepthFrame>, SphereScene)) {
        let (frames, scene) = sphere_frames;
        let num_frames = frames.len();
        let mut session = ScanSession::new(scene.config.clone()).unwrap();
        let mut source = FrameList::new(frames);
        let mut coverage = FrameCountCoverage::new(2);

        let mesh = session.run(&mut source, &mut coverage).unwrap();
        assert_eq!(session.frames_fused(), 2);
        assert_eq!(source.len(), num_frames - 2);
        assert!(!mesh.is_empty());
        assert!(session.grid().is_idle());
    }

    #[rstest]
    fn test_run_until_exhausted(sphere_frames: (Vec<DepthFrame>, SphereScene)) {
        let (frames, scene) = sphere_frames;
        let num_frames = frames.len();
        let mut session = ScanSession::new(scene.config.clone()).unwrap();

        let mesh = session
            .run(&mut FrameList::new(frames), &mut ExhaustSource)
            .unwrap();
        assert_eq!(session.frames_fused(), num_frames);
        assert!(!mesh.is_empty());

        let grid_bounds = session.grid().world_bounds();
        for vertex in mesh.vertices.iter() {
            assert!(grid_bounds.contains(vertex, 1e-5));
        }
    }

    #[rstest]
    fn test_reset(sphere_frames: (Vec<DepthFrame>, SphereScene)) {
        let (frames, scene) = sphere_frames;
        let mut session = ScanSession::new(scene.config.clone()).unwrap();
        session.integrate(&frames[0]).unwrap();
        assert!(session.grid().observed_voxels() > 0);

        session.reset().unwrap();
        assert_eq!(session.frames_fused(), 0);
        assert_eq!(session.grid().observed_voxels(), 0);
        assert!(session.extract().unwrap().is_empty());
    }
}
