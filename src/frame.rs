use ndarray::Zip;

use crate::{
    camera::{CameraIntrinsics, PinholeCamera},
    error::F3dError,
    image::{ConfidenceLevel, ConfidenceMap, DepthMap},
    transform::Transform,
};

/// One capture tick: depth, optional confidence, intrinsics and the camera pose.
#[derive(Clone, Debug)]
pub struct DepthFrame {
    pub depth: DepthMap,
    /// Sensor confidence. The fusion kernel does not read it; see [`DepthFrame::filter_by_confidence`].
    pub confidence: Option<ConfidenceMap>,
    pub intrinsics: CameraIntrinsics,
    /// Transforms points from camera to world.
    pub camera_to_world: Transform,
}

impl DepthFrame {
    pub fn new(depth: DepthMap, intrinsics: CameraIntrinsics, camera_to_world: Transform) -> Self {
        Self {
            depth,
            confidence: None,
            intrinsics,
            camera_to_world,
        }
    }

    pub fn with_confidence(mut self, confidence: ConfidenceMap) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn width(&self) -> usize {
        self.depth.width()
    }

    pub fn height(&self) -> usize {
        self.depth.height()
    }

    /// Checks that the frame can be integrated: non-empty depth map, confidence map
    /// of the same shape and non-degenerate intrinsics.
    pub fn validate(&self) -> Result<(), F3dError> {
        if self.depth.is_empty() {
            return Err(F3dError::configuration(format!(
                "depth map has zero size ({}x{})",
                self.width(),
                self.height()
            )));
        }

        if let Some(confidence) = &self.confidence {
            if confidence.dim() != self.depth.data.dim() {
                return Err(F3dError::configuration(format!(
                    "confidence map shape {:?} does not match depth map shape {:?}",
                    confidence.dim(),
                    self.depth.data.dim()
                )));
            }
        }

        self.intrinsics.validate()
    }

    /// Copy of the frame where depth pixels below the given confidence are marked
    /// as invalid (zero). Frames without confidence are returned unchanged.
    pub fn filter_by_confidence(&self, min_confidence: ConfidenceLevel) -> DepthFrame {
        let mut filtered = self.clone();
        if let Some(confidence) = &self.confidence {
            let min_confidence = min_confidence.value();
            Zip::from(&mut filtered.depth.data)
                .and(confidence)
                .for_each(|depth, &conf| {
                    if conf < min_confidence {
                        *depth = 0.0;
                    }
                });
        }
        filtered
    }

    pub fn pinhole_camera(&self) -> PinholeCamera {
        PinholeCamera::new(
            self.intrinsics.clone(),
            self.camera_to_world.clone(),
            self.width(),
            self.height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn sample_frame() -> DepthFrame {
        DepthFrame::new(
            DepthMap::new(array![[1.0, 2.0], [3.0, 4.0]]),
            CameraIntrinsics::from_simple_intrinsic(2.0, 2.0, 0.5, 0.5),
            Transform::eye(),
        )
    }

    #[test]
    fn test_validate() {
        assert!(sample_frame().validate().is_ok());

        let mut empty = sample_frame();
        empty.depth = DepthMap::new(Array2::zeros((0, 0)));
        assert!(matches!(empty.validate(), Err(F3dError::Configuration(_))));

        let mismatched = sample_frame().with_confidence(Array2::zeros((3, 2)));
        assert!(matches!(
            mismatched.validate(),
            Err(F3dError::Configuration(_))
        ));

        let mut degenerate = sample_frame();
        degenerate.intrinsics.fy = 0.0;
        assert!(degenerate.validate().is_err());
    }

    #[test]
    fn test_filter_by_confidence() {
        let frame = sample_frame().with_confidence(array![[0, 1], [2, 1]]);
        let filtered = frame.filter_by_confidence(ConfidenceLevel::Medium);
        assert_eq!(filtered.depth.data, array![[0.0, 2.0], [3.0, 4.0]]);

        let unfiltered = sample_frame().filter_by_confidence(ConfidenceLevel::High);
        assert_eq!(unfiltered.depth, sample_frame().depth);
    }
}
