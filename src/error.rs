use thiserror::Error;

/// Observer error types
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Weight matrix shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Weight snapshot was trained on a different grid configuration")]
    GridMismatch,

    #[error("Non-finite sample at step {step}")]
    NumericDegenerate { step: u64 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Worker thread panicked: {0}")]
    WorkerPanic(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ObserverError {
    /// Per-sample anomalies can be skipped; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ObserverError::NumericDegenerate { .. })
    }
}

/// Result type for observer operations
pub type Result<T> = std::result::Result<T, ObserverError>;
