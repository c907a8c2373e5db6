//! Error types for the token service.
//!
//! Note that token *validation* never returns these errors: it fails closed
//! with `None`/`false` so every denial looks the same to the caller. Errors
//! here surface only from administrative operations (issuing, granting,
//! revoking) where the caller is already authorized.

use thiserror::Error;

/// Errors from token service operations.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized")]
    Unauthorized,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Storage(#[from] sealdrive_store::StoreError),
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, TokenError>;
