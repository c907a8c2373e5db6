//! Wrapped key records.
//!
//! A WrappedKey is one principal's encrypted copy of a file's content key.
//! Many wrapped keys can reference the same content key (fan-out for
//! sharing); deleting one never affects the others.

use serde::{Deserialize, Serialize};

use sealdrive_core::{FileId, Principal};

use crate::crypto::{KeySalt, WrapNonce};
use crate::error::{KeyError, Result};

/// A content key encrypted for one specific principal.
///
/// Invariant: at most one active WrappedKey exists per (file, principal);
/// wrapping again replaces the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// The file whose content key this wraps.
    pub file_id: FileId,

    /// The principal this copy is encrypted for.
    pub principal: Principal,

    /// The content key, AEAD-encrypted under the principal's wrap secret.
    pub ciphertext: Vec<u8>,

    /// Salt mixed into the wrap secret derivation.
    pub salt: KeySalt,

    /// Nonce used for the AEAD encryption.
    pub nonce: WrapNonce,

    /// When this copy was created (Unix milliseconds).
    pub issued_at: i64,
}

impl WrappedKey {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| KeyError::Serialization(e.to_string()))
    }
}
