//! Error types for Sealdrive Core.

use thiserror::Error;

/// Core errors that can occur in shared primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("decoding error: {0}")]
    DecodingError(String),
}
