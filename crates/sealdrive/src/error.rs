//! The facade error type.

use thiserror::Error;

/// Errors surfaced by [`crate::Drive`] operations.
///
/// Access-denial paths deliberately collapse: a caller denied access sees
/// `KeyNotFound` (via `Keys`) or a plain `AccessDenied`, never a reason.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Keys(#[from] sealdrive_keys::KeyError),

    #[error(transparent)]
    Tokens(#[from] sealdrive_tokens::TokenError),

    #[error(transparent)]
    Versions(#[from] sealdrive_versions::VersionError),

    #[error(transparent)]
    Storage(#[from] sealdrive_store::StoreError),

    #[error("access denied")]
    AccessDenied,

    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for drive operations.
pub type Result<T> = std::result::Result<T, DriveError>;
