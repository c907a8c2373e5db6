//! Error types for the storage layer.

use thiserror::Error;

/// Errors from the key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
