pub mod bounds;
pub mod camera;
pub mod coverage;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod image;
pub mod marching_cubes;
pub mod mesh;
pub mod session;
pub mod source;
pub mod transform;
pub mod volume;

mod utils;

#[cfg(test)]
mod unit_test;

pub use error::F3dError;
pub use frame::DepthFrame;
pub use fusion::{FusionParameters, FusionSummary, TsdfFusion};
pub use marching_cubes::{ExtractionParameters, MarchingCubes};
pub use mesh::Mesh;
pub use session::ScanSession;
pub use volume::{VolumeConfig, VoxelGrid};
