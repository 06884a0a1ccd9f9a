//! Error types for the Matrixon sliding sync core
//!
//! Decode failures keep the underlying `serde_json` error so callers can see
//! exactly where a response or request body stopped parsing.

use thiserror::Error;

/// Matrixon error types
#[derive(Debug, Error)]
pub enum MatrixonError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for Matrixon operations
pub type Result<T> = std::result::Result<T, MatrixonError>;

impl From<serde_json::Error> for MatrixonError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            MatrixonError::Serialization(err.to_string())
        } else {
            MatrixonError::Deserialization(err)
        }
    }
}

impl From<figment::Error> for MatrixonError {
    fn from(err: figment::Error) -> Self {
        MatrixonError::InvalidConfig(err.to_string())
    }
}

impl MatrixonError {
    /// Returns the underlying JSON error for decode failures.
    pub fn as_json_error(&self) -> Option<&serde_json::Error> {
        match self {
            MatrixonError::Deserialization(err) => Some(err),
            _ => None,
        }
    }
}
