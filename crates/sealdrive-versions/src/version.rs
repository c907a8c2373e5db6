//! Immutable version records.
//!
//! A version captures one state of a file: its content hash and size, who
//! wrote it, where it sits in the branch graph, and how it differs from its
//! parent. Versions are never modified after creation except for the head
//! flag and the merkle anchor, both of which the engine maintains.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sealdrive_core::{ContentHash, FileId, Principal, VersionId};

use crate::error::{Result, VersionError};

/// How a version came to be, relative to the branch head it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// The first version of a file.
    Create,
    /// Content changed; size delta ratio at most 0.1.
    MinorChange,
    /// Content changed; size delta ratio above 0.1.
    ModerateChange,
    /// Content changed; size delta ratio above 0.5.
    MajorChange,
    /// Identical content bytes, only metadata differs.
    MetadataOnly,
    /// A rollback to an earlier version's content.
    Revert,
    /// The result of merging two branches.
    Merge,
}

/// The parent link(s) of a version. A version has zero, one or two parents
/// and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parentage {
    /// No parent: the initial version.
    Root,
    /// One parent: an ordinary successor.
    Linear { parent: VersionId },
    /// Two parents: a merge commit.
    Merge {
        source: VersionId,
        target: VersionId,
    },
}

impl Parentage {
    /// Parent ids, in source-before-target order for merges.
    pub fn parents(&self) -> Vec<VersionId> {
        match self {
            Parentage::Root => Vec::new(),
            Parentage::Linear { parent } => vec![*parent],
            Parentage::Merge { source, target } => vec![*source, *target],
        }
    }
}

/// One immutable state of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique version identifier.
    pub id: VersionId,

    /// The file this version belongs to.
    pub file_id: FileId,

    /// Monotonic per-file version number, starting at 1.
    pub number: u64,

    /// Blake3 hash of the content bytes.
    pub content_hash: ContentHash,

    /// Content size in bytes.
    pub size: u64,

    /// Who created this version.
    pub author: Principal,

    /// Creation time (Unix milliseconds).
    pub timestamp: i64,

    /// Caller-supplied metadata.
    pub metadata: BTreeMap<String, String>,

    /// Parent link(s) in the branch graph.
    pub parents: Parentage,

    /// The branch this version was committed to.
    pub branch: String,

    /// How this version relates to its predecessor.
    pub change_type: ChangeType,

    /// Free-form description.
    pub description: String,

    /// Merkle root over the file's full history. Present on the latest
    /// version only; `None` everywhere else.
    pub merkle_root: Option<ContentHash>,

    /// Whether this version is the head of its branch.
    pub is_head: bool,
}

impl Version {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| VersionError::Serialization(e.to_string()))
    }
}

/// Classify a content change against the previous head.
///
/// Identical hashes are a metadata-only change regardless of anything else.
/// Otherwise the size delta ratio `|new - old| / max(old, new, 1)` decides:
/// above 0.5 is major, above 0.1 is moderate, the rest is minor.
pub fn classify_change(
    old_hash: &ContentHash,
    new_hash: &ContentHash,
    old_size: u64,
    new_size: u64,
) -> ChangeType {
    if old_hash == new_hash {
        return ChangeType::MetadataOnly;
    }

    let delta = old_size.abs_diff(new_size) as f64;
    let ratio = delta / old_size.max(new_size).max(1) as f64;

    if ratio > 0.5 {
        ChangeType::MajorChange
    } else if ratio > 0.1 {
        ChangeType::ModerateChange
    } else {
        ChangeType::MinorChange
    }
}
