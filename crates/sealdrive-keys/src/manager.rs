//! The key manager.
//!
//! Owns the installation root secret and every wrapped key. All derivations
//! are keyed off the root secret, so losing it invalidates every wrapped
//! key irrecoverably. There is deliberately no escrow path.

use std::collections::HashMap;
use std::sync::RwLock;

use rand::RngCore;
use tracing::debug;

use sealdrive_core::{now_millis, FileId, Principal};
use sealdrive_store::KvStore;

use crate::crypto::{derive_secret, ContentKey, KeySalt, WrapNonce};
use crate::error::{KeyError, Result};
use crate::wrapped::WrappedKey;

/// Store key for the persisted root secret.
const ROOT_SECRET_KEY: &str = "keys/root";

/// Derivation contexts. Changing any of these invalidates existing data.
const CONTENT_KEY_CONTEXT: &str = "sealdrive-v1 content key";
const WRAP_SECRET_CONTEXT: &str = "sealdrive-v1 wrap secret";

/// The per-installation root secret.
///
/// Generated once, persisted opaquely, never exported.
struct RootSecret([u8; 32]);

impl Drop for RootSecret {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

impl std::fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootSecret(..)")
    }
}

/// Derives, wraps, unwraps and revokes per-file content keys.
///
/// Constructed once per process/tenant and passed by reference; holds no
/// ambient global state. Mutations for a given (file, principal) pair are
/// last-write-wins against the store; callers serialize those pairs.
pub struct KeyManager<S: KvStore> {
    store: S,
    root: RootSecret,

    /// Session cache: content keys already derived this session.
    ///
    /// Makes `derive_file_key` reproducible within a session while keeping
    /// each key unique per creation time across sessions.
    session_keys: RwLock<HashMap<(FileId, Principal), ContentKey>>,
}

impl<S: KvStore> KeyManager<S> {
    /// Open the key manager, loading or creating the root secret.
    pub fn open(store: S) -> Result<Self> {
        let root = match store.get(ROOT_SECRET_KEY)? {
            Some(bytes) if bytes.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                RootSecret(arr)
            }
            Some(_) => return Err(KeyError::Serialization("malformed root secret".into())),
            None => {
                let mut arr = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut arr);
                store.set(ROOT_SECRET_KEY, &arr)?;
                debug!("generated new installation root secret");
                RootSecret(arr)
            }
        };

        Ok(Self {
            store,
            root,
            session_keys: RwLock::new(HashMap::new()),
        })
    }

    /// Derive (or recall) the content key for a file.
    ///
    /// The first call for a (file, principal) pair draws fresh randomness,
    /// so the key is unique per creation time and not derivable by any
    /// other principal from public inputs. Subsequent calls in the same
    /// session return the identical key.
    pub fn derive_file_key(&self, file_id: &FileId, principal: &Principal) -> ContentKey {
        let cache_key = (file_id.clone(), principal.clone());

        if let Some(key) = self.session_keys.read().unwrap().get(&cache_key) {
            return key.clone();
        }

        let mut entropy = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut entropy);
        let now = now_millis().to_be_bytes();

        let bytes = derive_secret(
            CONTENT_KEY_CONTEXT,
            &[
                &self.root.0,
                file_id.as_str().as_bytes(),
                principal.as_bytes(),
                &now,
                &entropy,
            ],
        );
        let key = ContentKey::from_bytes(bytes);

        self.session_keys
            .write()
            .unwrap()
            .insert(cache_key, key.clone());
        key
    }

    /// Encrypt a content key for a principal and persist it.
    ///
    /// Replaces any prior wrapped key for the same (file, principal) pair:
    /// a grant is an idempotent overwrite, not additive.
    pub fn wrap_key(
        &self,
        file_id: &FileId,
        principal: &Principal,
        content_key: &ContentKey,
    ) -> Result<WrappedKey> {
        let salt = KeySalt::generate();
        let nonce = WrapNonce::generate();

        let wrap_secret = self.wrap_secret(principal, &salt);
        let ciphertext = wrap_secret.encrypt(content_key.as_bytes(), &nonce)?;

        let wrapped = WrappedKey {
            file_id: file_id.clone(),
            principal: principal.clone(),
            ciphertext,
            salt,
            nonce,
            issued_at: now_millis(),
        };

        self.store
            .set(&wrapped_key_path(file_id, principal), &wrapped.to_bytes())?;

        debug!(file = %file_id, principal = %principal, "wrapped content key");
        Ok(wrapped)
    }

    /// Look up and decrypt the wrapped key for a (file, principal) pair.
    ///
    /// Absence, a corrupted record, and an AEAD failure all surface as
    /// `KeyNotFound`; distinguishing them would leak key lifecycle state.
    pub fn unwrap_key(&self, file_id: &FileId, principal: &Principal) -> Result<ContentKey> {
        let bytes = self
            .store
            .get(&wrapped_key_path(file_id, principal))?
            .ok_or(KeyError::KeyNotFound)?;

        let wrapped = WrappedKey::from_bytes(&bytes).map_err(|_| KeyError::KeyNotFound)?;

        let wrap_secret = self.wrap_secret(principal, &wrapped.salt);
        let key_bytes = wrap_secret
            .decrypt(&wrapped.ciphertext, &wrapped.nonce)
            .map_err(|_| KeyError::KeyNotFound)?;

        if key_bytes.len() != 32 {
            return Err(KeyError::KeyNotFound);
        }

        let mut arr = [0u8; 32];
        arr.copy_from_slice(&key_bytes);
        Ok(ContentKey::from_bytes(arr))
    }

    /// Delete the wrapped key for a (file, principal) pair.
    ///
    /// Idempotent. Never touches the underlying content key or any other
    /// principal's wrapped copy.
    pub fn revoke_key(&self, file_id: &FileId, principal: &Principal) -> Result<()> {
        self.store.remove(&wrapped_key_path(file_id, principal))?;
        self.session_keys
            .write()
            .unwrap()
            .remove(&(file_id.clone(), principal.clone()));

        debug!(file = %file_id, principal = %principal, "revoked wrapped key");
        Ok(())
    }

    /// List principals currently holding a wrapped copy of a file's key.
    pub fn wrapped_principals(&self, file_id: &FileId) -> Result<Vec<Principal>> {
        let prefix = format!("wrapped/{}/", hex::encode(file_id.as_str()));
        let mut principals = Vec::new();

        for key in self.store.list_prefix(&prefix)? {
            if let Some(bytes) = self.store.get(&key)? {
                if let Ok(wrapped) = WrappedKey::from_bytes(&bytes) {
                    principals.push(wrapped.principal);
                }
            }
        }

        Ok(principals)
    }

    /// Per-principal wrap secret for a given salt.
    fn wrap_secret(&self, principal: &Principal, salt: &KeySalt) -> ContentKey {
        let bytes = derive_secret(
            WRAP_SECRET_CONTEXT,
            &[&self.root.0, principal.as_bytes(), salt.as_bytes()],
        );
        ContentKey::from_bytes(bytes)
    }
}

/// Store path for a wrapped key record.
///
/// File ids and principals are opaque caller strings; hex-encoding keeps
/// the namespace unambiguous even if they contain separators.
fn wrapped_key_path(file_id: &FileId, principal: &Principal) -> String {
    format!(
        "wrapped/{}/{}",
        hex::encode(file_id.as_str()),
        hex::encode(principal.as_str())
    )
}
