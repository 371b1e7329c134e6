use thiserror::Error;

/// Main error type for minnow operations
///
/// Variants map one-to-one onto the index core's error kinds: callers can
/// match on the variant without inspecting messages.
#[derive(Error, Debug)]
pub enum MinnowError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("data loss: {0}")]
    DataLoss(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Result type alias for minnow operations
pub type Result<T> = std::result::Result<T, MinnowError>;

impl From<std::io::Error> for MinnowError {
    fn from(err: std::io::Error) -> Self {
        MinnowError::Internal(err.to_string())
    }
}

impl MinnowError {
    /// Check whether this error reports on-disk corruption rather than a
    /// caller mistake or environmental failure.
    pub fn is_data_loss(&self) -> bool {
        matches!(self, MinnowError::DataLoss(_))
    }
}
