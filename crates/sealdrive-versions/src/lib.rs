//! # Sealdrive Versions
//!
//! The version control engine: every file carries a branch graph of
//! immutable versions, each addressed by content hash and anchored by a
//! merkle root over the full history.
//!
//! ## Model
//!
//! A version has zero, one or two parents ([`Parentage`]) and exactly one
//! branch. Each branch has exactly one head at all times. Merges are
//! all-or-nothing: a conflicted merge with no resolution reports the
//! conflicts and mutates nothing. Reverts append; history is only ever
//! shortened by the explicit [`VersionControlEngine::cleanup_old_versions`]
//! call.

pub mod branch;
pub mod engine;
pub mod error;
pub mod merkle;
pub mod version;

pub use branch::{Branch, MAIN_BRANCH};
pub use engine::{
    Conflict, MergeOutcome, MergeResolution, VersionComparison, VersionControlEngine,
    DEFAULT_HISTORY_LIMIT,
};
pub use error::{Result, VersionError};
pub use merkle::merkle_root;
pub use version::{classify_change, ChangeType, Parentage, Version};
