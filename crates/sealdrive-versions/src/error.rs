//! Error types for the version engine.

use thiserror::Error;

/// Errors from version control operations.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for version operations.
pub type Result<T> = std::result::Result<T, VersionError>;
