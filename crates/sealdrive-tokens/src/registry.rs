//! Token revocation registry.
//!
//! Tokens are self-contained, but revocation needs shared state: a small
//! persisted entry per token id recording whether it is still active. Once
//! an entry goes inactive it never comes back.

use serde::{Deserialize, Serialize};

use sealdrive_core::TokenId;
use sealdrive_store::KvStore;

use crate::error::{Result, TokenError};

/// Registry record for one issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// The token this entry tracks.
    pub token_id: TokenId,

    /// Whether the token is still usable.
    pub active: bool,

    /// Issue time (Unix milliseconds).
    pub issued_at: i64,

    /// When the token was revoked or noticed expired, if ever.
    pub revoked_at: Option<i64>,
}

impl RegistryEntry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| TokenError::Serialization(e.to_string()))
    }
}

/// Persisted registry over a key-value store.
pub struct TokenRegistry<S: KvStore> {
    store: S,
}

impl<S: KvStore> TokenRegistry<S> {
    /// Create a registry over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Register a freshly issued token as active.
    pub fn register(&self, token_id: &TokenId, issued_at: i64) -> Result<()> {
        let entry = RegistryEntry {
            token_id: *token_id,
            active: true,
            issued_at,
            revoked_at: None,
        };
        self.store.set(&entry_path(token_id), &entry.to_bytes())?;
        Ok(())
    }

    /// Look up a registry entry.
    pub fn get(&self, token_id: &TokenId) -> Result<Option<RegistryEntry>> {
        match self.store.get(&entry_path(token_id))? {
            Some(bytes) => Ok(Some(RegistryEntry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Mark a token inactive (terminal). Idempotent.
    pub fn deactivate(&self, token_id: &TokenId, at: i64) -> Result<()> {
        if let Some(mut entry) = self.get(token_id)? {
            if entry.active {
                entry.active = false;
                entry.revoked_at = Some(at);
                self.store.set(&entry_path(token_id), &entry.to_bytes())?;
            }
        }
        Ok(())
    }

    /// Whether a token id is registered and still active.
    pub fn is_active(&self, token_id: &TokenId) -> Result<bool> {
        Ok(self.get(token_id)?.map(|e| e.active).unwrap_or(false))
    }
}

fn entry_path(token_id: &TokenId) -> String {
    format!("tokens/registry/{}", token_id.to_hex())
}
