mod config;
pub use config::{triangle_capacity_estimate, VolumeConfig};

mod grid;
pub use grid::VoxelGrid;

mod pass;
pub use pass::{PassGuard, PassKind};
