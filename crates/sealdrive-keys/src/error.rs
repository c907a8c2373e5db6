//! Error types for the key manager.

use thiserror::Error;

/// Errors from key management operations.
///
/// `KeyNotFound` deliberately collapses "no wrapped key exists" and
/// "decryption failed" into one case, so callers cannot distinguish a
/// missing grant from a corrupted or foreign wrapped key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no key available for this file and principal")]
    KeyNotFound,

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Storage(#[from] sealdrive_store::StoreError),
}

/// Result alias for key operations.
pub type Result<T> = std::result::Result<T, KeyError>;
