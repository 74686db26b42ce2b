//! Error types for the sparse virtualization core.

use thiserror::Error;

/// Fatal errors raised while reading the binary index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid index signature: {0:?}")]
    InvalidSignature([u8; 4]),

    #[error("Unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("Index truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("Index path of {length} bytes exceeds the {max} byte path buffer")]
    PathTooLong { length: usize, max: usize },

    #[error("Invalid prefix length {strip} for previous path of {previous} bytes")]
    InvalidPrefixLength { strip: usize, previous: usize },

    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the index projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Index parse failed: {0}")]
    Index(#[from] IndexError),

    #[error("Path is not a folder in the projection: {0}")]
    NotAFolder(String),

    #[error("Invalid projection path: {0:?}")]
    InvalidPath(String),
}

/// Admission failures returned synchronously when work cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Work queue is closed: virtualizer is shutting down")]
    ShuttingDown,

    #[error("Worker pool has already been started")]
    AlreadyStarted,

    #[error("Worker pool has not been started")]
    NotStarted,

    #[error("Number of worker threads must be greater than 0")]
    InvalidWorkerCount,

    #[error("Failed to start virtualization: {0}")]
    StartFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
