//! Cryptographic utilities for the key manager.
//!
//! ChaCha20-Poly1305 authenticated encryption plus Blake3 key derivation.
//! All derivations are domain-separated through `Hasher::new_derive_key`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, Result};

/// A 256-bit symmetric content key for ChaCha20-Poly1305.
///
/// Scoped to exactly one file. Never persisted unwrapped; the raw bytes are
/// overwritten on drop as a best-effort scrub (clones made for wrapping are
/// scrubbed when they drop too).
#[derive(Clone)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &WrapNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeyError::Encryption(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| KeyError::Encryption(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &WrapNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| KeyError::Encryption(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| KeyError::Encryption(e.to_string()))
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentKey(..)")
    }
}

/// A 128-bit random salt mixed into each wrap secret derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySalt(pub [u8; 16]);

impl KeySalt {
    /// Generate a new random salt.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapNonce(pub [u8; 12]);

impl WrapNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Derive a 256-bit secret from the given context and input parts.
///
/// Blake3 `derive_key` gives domain separation between the content-key,
/// wrap-secret and MAC-key derivations. Each part is length-prefixed so
/// variable-length inputs keep their boundaries: `["ab", "c"]` and
/// `["a", "bc"]` derive different secrets.
pub(crate) fn derive_secret(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Format identifier for encrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// An encrypted content envelope.
///
/// Wraps a file's encrypted bytes together with the metadata needed to
/// decrypt them (assuming the caller can unwrap the content key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Nonce used for encryption (unique per encryption).
    pub nonce: WrapNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encrypt plaintext with the given content key.
    pub fn encrypt(plaintext: &[u8], key: &ContentKey) -> Result<Self> {
        let nonce = WrapNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the given content key.
    pub fn decrypt(&self, key: &ContentKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }

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

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}
