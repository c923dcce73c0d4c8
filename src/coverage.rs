use crate::{frame::DepthFrame, fusion::FusionSummary};

/// Decides when enough of the scene has been observed to extract the surface.
pub trait CoverageTracker {
    /// Called after each fused frame.
    fn observe(&mut self, frame: &DepthFrame, summary: &FusionSummary);
    fn is_sufficient(&self) -> bool;
}

/// Sufficient after a fixed number of frames that updated at least one voxel.
#[derive(Clone, Debug)]
pub struct FrameCountCoverage {
    required: usize,
    observed: usize,
}

impl FrameCountCoverage {
    pub fn new(required: usize) -> Self {
        Self {
            required,
            observed: 0,
        }
    }

    pub fn observed(&self) -> usize {
        self.observed
    }
}

impl CoverageTracker for FrameCountCoverage {
    fn observe(&mut self, _frame: &DepthFrame, summary: &FusionSummary) {
        if summary.num_updated > 0 {
            self.observed += 1;
        }
    }

    fn is_sufficient(&self) -> bool {
        self.observed >= self.required
    }
}

/// Never sufficient; the session fuses until the source runs out.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExhaustSource;

impl CoverageTracker for ExhaustSource {
    fn observe(&mut self, _frame: &DepthFrame, _summary: &FusionSummary) {}

    fn is_sufficient(&self) -> bool {
        false
    }
}
