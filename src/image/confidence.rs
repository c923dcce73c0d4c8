use ndarray::Array2;

/// Per-pixel confidence of a depth map, same shape. Values follow [`ConfidenceLevel`].
pub type ConfidenceMap = Array2<u8>;

/// Sensor confidence levels stored in a [`ConfidenceMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConfidenceLevel {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl ConfidenceLevel {
    pub fn value(self) -> u8 {
        self as u8
    }
}
