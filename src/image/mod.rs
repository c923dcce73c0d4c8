mod depth;
pub use depth::DepthMap;

mod confidence;
pub use confidence::{ConfidenceLevel, ConfidenceMap};
