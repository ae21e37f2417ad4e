//! Error types for the staging orchestrator

use thiserror::Error;

/// Main error type for the staging orchestrator
#[derive(Error, Debug)]
pub enum StagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Application snapshot is missing required references
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Synchronous staging did not produce a droplet
    #[error("Staging error: {0}")]
    StagingError(String),

    /// The async staging reply carried an error
    #[error("Async staging error: {0}")]
    AsyncError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for StagerError {
    fn from(err: anyhow::Error) -> Self {
        StagerError::Internal(err.to_string())
    }
}
