//! Store trait: the abstract key-value interface.
//!
//! This trait keeps the key manager and token registries storage-agnostic.
//! Implementations include SQLite (primary) and in-memory (for tests).
//!
//! # Design Notes
//!
//! - **Synchronous**: every core operation is bounded and performs no
//!   network I/O, so the contract is plain function calls.
//! - **Idempotent removal**: removing an absent key is a no-op, which lets
//!   revocation be retried safely.
//! - **Prefix listing**: namespaced keys (`wrapped/<file>/...`) are
//!   enumerated with `list_prefix`, the only query shape the core needs.

use crate::error::Result;

/// Abstract persistent key-value store.
pub trait KvStore: Send + Sync {
    /// Get the value stored under a key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set the value under a key, replacing any prior value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key. No-op if the key is absent.
    fn remove(&self, key: &str) -> Result<()>;

    /// List all keys starting with the given prefix, sorted.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list_prefix(prefix)
    }
}
