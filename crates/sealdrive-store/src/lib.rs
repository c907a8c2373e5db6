//! # Sealdrive Store
//!
//! Per-installation persistent key-value storage.
//!
//! The key manager and capability token registries persist their records
//! through the [`KvStore`] trait so they survive restarts. Two
//! implementations are provided:
//!
//! - [`MemoryStore`]: in-memory, for tests
//! - [`SqliteStore`]: durable single-file SQLite database
//!
//! Keys are namespaced strings (`wrapped/<file>/<principal>`,
//! `tokens/registry/<id>`, ...); values are opaque CBOR blobs owned by the
//! calling crate.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::KvStore;
