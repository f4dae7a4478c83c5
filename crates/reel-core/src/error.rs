//! Error types for reel

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Invalid scheduling status: {0}")]
    InvalidSchedulingStatus(String),

    #[error("Serialization failure: {0}")]
    Serialization(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// Errors that a mutation absorbs as a logged no-op instead of failing
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidState(_))
    }
}
