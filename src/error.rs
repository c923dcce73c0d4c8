use thiserror::Error;

/// Main error type for the library.
#[derive(Debug, Error)]
pub enum F3dError {
    /// Invalid volume configuration or malformed input frame. Raised before any pass runs.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Marching cubes produced more triangles than the output buffer holds.
    #[error("Capacity overflow: extraction needs {required} triangles, but the buffer holds {capacity}")]
    CapacityOverflow { required: usize, capacity: usize },
    /// A pass or reset was issued while another pass holds the voxel grid.
    #[error("Concurrency violation: {0}")]
    ConcurrencyViolation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parser error: {0}")]
    Parser(String),
}

impl F3dError {
    /// Create a error with the kind `Configuration`.
    /// # Arguments
    /// * `msg` - The error message.
    pub fn configuration<T: ToString>(msg: T) -> Self {
        F3dError::Configuration(msg.to_string())
    }

    /// Create a error with the kind `ConcurrencyViolation`.
    pub fn concurrency_violation<T: ToString>(msg: T) -> Self {
        F3dError::ConcurrencyViolation(msg.to_string())
    }
}

impl From<serde_json::Error> for F3dError {
    fn from(err: serde_json::Error) -> Self {
        F3dError::Parser(err.to_string())
    }
}
