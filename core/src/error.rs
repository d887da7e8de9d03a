use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{url} returned a weak validator; cannot guarantee a consistent download")]
    WeakValidator { url: String },
    #[error("no usable sources")]
    NoSources,
    #[error("chunk {index} failed permanently after {attempts} attempts: {reason}")]
    ChunkAbandoned {
        index: usize,
        attempts: u32,
        reason: String,
    },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("download canceled")]
    Canceled,
}

impl CoreError {
    /// Local filesystem failures as opposed to source-side failures.
    pub fn is_local(&self) -> bool {
        matches!(self, CoreError::Io(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
