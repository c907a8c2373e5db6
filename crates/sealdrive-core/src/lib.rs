//! # Sealdrive Core
//!
//! Core primitives shared by every Sealdrive crate:
//!
//! - [`ContentHash`]: Blake3 content digests
//! - Strong identifier newtypes ([`FileId`], [`VersionId`], [`TokenId`], [`LinkId`], [`Principal`])
//! - Canonical CBOR encoding for MAC inputs
//! - The append-only audit log ([`AuditLog`], [`ChangeEvent`])
//! - The advisory integrity verifier

pub mod audit;
pub mod canonical;
pub mod error;
pub mod hash;
pub mod integrity;
pub mod time;
pub mod types;

pub use audit::{AuditLog, ChangeEvent, EventKind};
pub use canonical::{decode_value, encode_value};
pub use error::CoreError;
pub use hash::ContentHash;
pub use integrity::{verify_content, ExpectedContent, IntegrityReport};
pub use time::now_millis;
pub use types::{FileId, LinkId, Principal, TokenId, VersionId};
