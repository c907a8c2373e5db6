//! # Sealdrive Keys
//!
//! Per-file envelope-encryption key management.
//!
//! ## Encryption Model
//!
//! Encrypted content uses a two-layer key model:
//!
//! 1. **Content Key**: a symmetric key (ChaCha20-Poly1305) that encrypts
//!    the file bytes. One per file.
//! 2. **Wrapped Keys**: the content key is encrypted separately for each
//!    principal, under a secret derived from the installation root secret,
//!    the principal, and a per-wrap salt.
//!
//! This allows:
//! - Granting read access without re-encrypting content
//! - Revoking one principal without touching anyone else's copy
//! - The content key never being persisted or transmitted in the clear
//!
//! The root secret is generated once per installation. Losing it
//! invalidates every wrapped key irrecoverably; there is no escrow.

pub mod crypto;
pub mod error;
pub mod manager;
pub mod wrapped;

pub use crypto::{ContentKey, EncryptedPayload, EncryptionFormat, KeySalt, WrapNonce};
pub use error::{KeyError, Result};
pub use manager::KeyManager;
pub use wrapped::WrappedKey;
