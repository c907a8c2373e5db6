//! # Sealdrive
//!
//! An encrypted file sharing core. Three pillars behind one facade:
//!
//! - **Keys** ([`sealdrive_keys`]): every file gets its own content key,
//!   envelope-encrypted per principal. Sharing wraps the same key for the
//!   grantee; revocation deletes their copy and nothing else.
//! - **Tokens** ([`sealdrive_tokens`]): signed, scoped, expiring capability
//!   tokens with a revocation registry and per-file ACLs. Validation fails
//!   closed and permission checks are conjunctive.
//! - **Versions** ([`sealdrive_versions`]): branch graphs of immutable,
//!   content-addressed versions with merge, revert and merkle anchoring.
//!
//! [`Drive`] composes the three over a single [`sealdrive_store::KvStore`]
//! and serializes mutations per file id. Construct one per process/tenant:
//!
//! ```
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use sealdrive::{Drive, FileId, Principal};
//! use sealdrive_store::MemoryStore;
//!
//! let drive = Drive::open(Arc::new(MemoryStore::new())).unwrap();
//! let alice = Principal::new("alice");
//! let file = FileId::new("report.txt");
//!
//! drive.create_file(&file, b"hello", BTreeMap::new(), &alice).unwrap();
//! let content = drive.read_file(&file, &alice, None).unwrap();
//! assert_eq!(&content.bytes[..], b"hello");
//! ```

pub mod drive;
pub mod error;

pub use drive::{Drive, FileContent};
pub use error::{DriveError, Result};

// Re-export the types callers need to drive the facade.
pub use sealdrive_core::{
    AuditLog, ChangeEvent, ContentHash, EventKind, FileId, IntegrityReport, LinkId, Principal,
    TokenId, VersionId,
};
pub use sealdrive_tokens::{AccessToken, Permission, SharingLink, TokenPayload};
pub use sealdrive_versions::{
    Branch, ChangeType, MergeOutcome, MergeResolution, Parentage, Version, VersionComparison,
    MAIN_BRANCH,
};
