use std::collections::VecDeque;

use crate::{error::F3dError, frame::DepthFrame};

mod synthetic;
pub use synthetic::{render_sphere_depth, SphereOrbit};

/// Supplies depth frames in capture order.
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, F3dError>;
}

/// In-memory frame source.
#[derive(Clone, Debug, Default)]
pub struct FrameList {
    frames: VecDeque<DepthFrame>,
}

impl FrameList {
    pub fn new(frames: Vec<DepthFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: DepthFrame) {
        self.frames.push_back(frame);
    }
}

impl FromIterator<DepthFrame> for FrameList {
    fn from_iter<I: IntoIterator<Item = DepthFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl FrameSource for FrameList {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, F3dError> {
        Ok(self.frames.pop_front())
    }
}
