//! The version control engine.
//!
//! Per-file histories live in memory behind a single `RwLock`; every
//! mutation appends to the shared audit log. Persistence of version records
//! is the caller's concern (they round-trip through CBOR), the engine owns
//! the graph invariants:
//!
//! - version numbers are monotonic from 1
//! - exactly one head per (file, branch) after every mutation
//! - the merkle root is anchored on the most recent version only
//! - merges either fully apply or change nothing

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use sealdrive_core::{
    now_millis, AuditLog, ChangeEvent, ContentHash, EventKind, FileId, Principal, VersionId,
};

use crate::branch::{Branch, MAIN_BRANCH};
use crate::error::{Result, VersionError};
use crate::merkle::merkle_root;
use crate::version::{classify_change, ChangeType, Parentage, Version};

/// Default history page size.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One field-level disagreement between two branch heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// `content` or `metadata:<key>`.
    pub field: String,

    /// The source head's value, if present.
    pub source_value: Option<String>,

    /// The target head's value, if present.
    pub target_value: Option<String>,
}

/// How to resolve a conflicted merge.
#[derive(Debug, Clone, Default)]
pub struct MergeResolution {
    /// Take the source head's content instead of the target's.
    pub use_source: bool,

    /// Metadata entries overriding the target head's.
    pub metadata: BTreeMap<String, String>,
}

/// The result of a merge attempt.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Whether a merge version was created.
    pub success: bool,

    /// The merge version, when successful.
    pub version: Option<Version>,

    /// The disagreements found between the two heads.
    pub conflicts: Vec<Conflict>,

    /// Stable identifier for this conflict set, for resolution workflows.
    /// Present only on failure.
    pub conflict_id: Option<String>,
}

/// The result of comparing two versions.
#[derive(Debug, Clone)]
pub struct VersionComparison {
    pub version_a: VersionId,
    pub version_b: VersionId,

    /// Human-readable field differences.
    pub differences: Vec<String>,

    /// Weighted similarity in `[0, 1]`; 1.0 means identical.
    pub similarity: f64,
}

struct FileHistory {
    /// Versions in creation order.
    versions: Vec<Version>,
    branches: BTreeMap<String, Branch>,
}

impl FileHistory {
    fn find(&self, id: &VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == *id)
    }

    fn find_mut(&mut self, id: &VersionId) -> Option<&mut Version> {
        self.versions.iter_mut().find(|v| v.id == *id)
    }

    fn next_number(&self) -> u64 {
        self.versions.iter().map(|v| v.number).max().unwrap_or(0) + 1
    }

    /// Recompute the merkle root and store it on the newest version only.
    fn anchor_merkle(&mut self) {
        for version in &mut self.versions {
            version.merkle_root = None;
        }
        let leaves: Vec<ContentHash> = self.versions.iter().map(|v| v.content_hash).collect();
        let root = merkle_root(&leaves);
        if let Some(last) = self.versions.last_mut() {
            last.merkle_root = root;
        }
    }

    /// Advance a branch to a new version: record it, move the head pointer,
    /// re-anchor the merkle root. Returns the version as recorded.
    fn advance(&mut self, branch: &str, version: Version) -> Version {
        if let Some(b) = self.branches.get_mut(branch) {
            b.head = version.id;
        }
        let anchored = version.clone();
        self.versions.push(version);
        self.anchor_merkle();
        self.versions
            .last()
            .cloned()
            .unwrap_or(anchored)
    }
}

/// In-memory version control over any number of files.
pub struct VersionControlEngine {
    files: RwLock<HashMap<FileId, FileHistory>>,
    audit: Arc<AuditLog>,
}

impl VersionControlEngine {
    /// Create an engine sharing the given audit log.
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Create version 1 of a new file on `main`.
    pub fn create_initial_version(
        &self,
        file_id: &FileId,
        content: &[u8],
        metadata: BTreeMap<String, String>,
        author: &Principal,
    ) -> Result<Version> {
        let mut files = self.files.write().unwrap();
        if files.contains_key(file_id) {
            return Err(VersionError::AlreadyExists(format!("file {}", file_id)));
        }

        let now = now_millis();
        let version = Version {
            id: VersionId::random(),
            file_id: file_id.clone(),
            number: 1,
            content_hash: ContentHash::hash(content),
            size: content.len() as u64,
            author: author.clone(),
            timestamp: now,
            metadata,
            parents: Parentage::Root,
            branch: MAIN_BRANCH.to_string(),
            change_type: ChangeType::Create,
            description: "initial version".to_string(),
            merkle_root: None,
            is_head: true,
        };

        let mut branches = BTreeMap::new();
        branches.insert(
            MAIN_BRANCH.to_string(),
            Branch {
                name: MAIN_BRANCH.to_string(),
                head: version.id,
                created: now,
                created_by: author.clone(),
                parent_branch: None,
            },
        );

        let mut history = FileHistory {
            versions: vec![version],
            branches,
        };
        history.anchor_merkle();
        let version = history.versions[0].clone();
        files.insert(file_id.clone(), history);

        self.audit.record(ChangeEvent::now(
            EventKind::FileCreated,
            Some(file_id.clone()),
            author.clone(),
            format!("version {} on {}", version.number, MAIN_BRANCH),
        ));
        info!(file = %file_id, "created file history");
        Ok(version)
    }

    /// Commit a new version on a branch (default `main`).
    pub fn create_new_version(
        &self,
        file_id: &FileId,
        content: &[u8],
        metadata: BTreeMap<String, String>,
        author: &Principal,
        description: impl Into<String>,
        branch: Option<&str>,
    ) -> Result<Version> {
        let branch_name = branch.unwrap_or(MAIN_BRANCH);
        let mut files = self.files.write().unwrap();
        let history = files
            .get_mut(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;

        let head_id = history
            .branches
            .get(branch_name)
            .map(|b| b.head)
            .ok_or_else(|| VersionError::NotFound(format!("branch {}", branch_name)))?;
        let head = history
            .find(&head_id)
            .ok_or_else(|| VersionError::NotFound(format!("head of {}", branch_name)))?;

        let content_hash = ContentHash::hash(content);
        let size = content.len() as u64;
        let change_type = classify_change(&head.content_hash, &content_hash, head.size, size);

        let version = Version {
            id: VersionId::random(),
            file_id: file_id.clone(),
            number: history.next_number(),
            content_hash,
            size,
            author: author.clone(),
            timestamp: now_millis(),
            metadata,
            parents: Parentage::Linear { parent: head_id },
            branch: branch_name.to_string(),
            change_type,
            description: description.into(),
            merkle_root: None,
            is_head: true,
        };

        if let Some(old_head) = history.find_mut(&head_id) {
            old_head.is_head = false;
        }
        let version = history.advance(branch_name, version);

        self.audit.record(ChangeEvent::now(
            EventKind::VersionCreated,
            Some(file_id.clone()),
            author.clone(),
            format!(
                "version {} ({:?}) on {}",
                version.number, version.change_type, branch_name
            ),
        ));
        debug!(file = %file_id, number = version.number, "created version");
        Ok(version)
    }

    /// Fork a new branch from the head of an existing one.
    pub fn create_branch(
        &self,
        file_id: &FileId,
        source: &str,
        new_name: &str,
        author: &Principal,
    ) -> Result<Branch> {
        let mut files = self.files.write().unwrap();
        let history = files
            .get_mut(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;

        if history.branches.contains_key(new_name) {
            return Err(VersionError::AlreadyExists(format!("branch {}", new_name)));
        }
        let source_head = history
            .branches
            .get(source)
            .map(|b| b.head)
            .ok_or_else(|| VersionError::NotFound(format!("branch {}", source)))?;

        let branch = Branch {
            name: new_name.to_string(),
            head: source_head,
            created: now_millis(),
            created_by: author.clone(),
            parent_branch: Some(source.to_string()),
        };
        history.branches.insert(new_name.to_string(), branch.clone());

        self.audit.record(ChangeEvent::now(
            EventKind::BranchCreated,
            Some(file_id.clone()),
            author.clone(),
            format!("branch {} from {}", new_name, source),
        ));
        debug!(file = %file_id, branch = new_name, "created branch");
        Ok(branch)
    }

    /// Merge `source` into `target`.
    ///
    /// Conflicts are content-hash and per-key metadata disagreements between
    /// the two heads. Unresolved conflicts abort the merge with no state
    /// change; the outcome carries the conflict list and a stable conflict
    /// id so a caller can retry with a [`MergeResolution`].
    pub fn merge_branches(
        &self,
        file_id: &FileId,
        source: &str,
        target: &str,
        author: &Principal,
        resolution: Option<MergeResolution>,
    ) -> Result<MergeOutcome> {
        let mut files = self.files.write().unwrap();
        let history = files
            .get_mut(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;

        let source_head_id = history
            .branches
            .get(source)
            .map(|b| b.head)
            .ok_or_else(|| VersionError::NotFound(format!("branch {}", source)))?;
        let target_head_id = history
            .branches
            .get(target)
            .map(|b| b.head)
            .ok_or_else(|| VersionError::NotFound(format!("branch {}", target)))?;

        let source_head = history
            .find(&source_head_id)
            .ok_or_else(|| VersionError::NotFound(format!("head of {}", source)))?
            .clone();
        let target_head = history
            .find(&target_head_id)
            .ok_or_else(|| VersionError::NotFound(format!("head of {}", target)))?
            .clone();

        let conflicts = detect_conflicts(&source_head, &target_head);

        let resolution = match (conflicts.is_empty(), resolution) {
            (false, None) => {
                // All-or-nothing: no heads move, nothing is recorded.
                return Ok(MergeOutcome {
                    success: false,
                    version: None,
                    conflict_id: Some(conflict_id(file_id, &source_head_id, &target_head_id)),
                    conflicts,
                });
            }
            (_, resolution) => resolution.unwrap_or_default(),
        };

        let (content_hash, size) = if resolution.use_source {
            (source_head.content_hash, source_head.size)
        } else {
            (target_head.content_hash, target_head.size)
        };
        let mut metadata = target_head.metadata.clone();
        metadata.extend(resolution.metadata);

        let version = Version {
            id: VersionId::random(),
            file_id: file_id.clone(),
            number: history.next_number(),
            content_hash,
            size,
            author: author.clone(),
            timestamp: now_millis(),
            metadata,
            parents: Parentage::Merge {
                source: source_head_id,
                target: target_head_id,
            },
            branch: target.to_string(),
            change_type: ChangeType::Merge,
            description: format!("merge {} into {}", source, target),
            merkle_root: None,
            is_head: true,
        };

        for id in [source_head_id, target_head_id] {
            if let Some(head) = history.find_mut(&id) {
                head.is_head = false;
            }
        }
        let version = history.advance(target, version);

        self.audit.record(ChangeEvent::now(
            EventKind::BranchMerged,
            Some(file_id.clone()),
            author.clone(),
            format!("merged {} into {} as version {}", source, target, version.number),
        ));
        info!(file = %file_id, source, target, "merged branches");
        Ok(MergeOutcome {
            success: true,
            version: Some(version),
            conflicts,
            conflict_id: None,
        })
    }

    /// Roll a branch back to an earlier version's content.
    ///
    /// Creates a new version carrying the target's hash and size; nothing
    /// in between is deleted.
    pub fn revert_to_version(
        &self,
        file_id: &FileId,
        target_version: &VersionId,
        author: &Principal,
        branch: Option<&str>,
    ) -> Result<Version> {
        let branch_name = branch.unwrap_or(MAIN_BRANCH);
        let mut files = self.files.write().unwrap();
        let history = files
            .get_mut(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;

        let target = history
            .find(target_version)
            .ok_or_else(|| VersionError::NotFound(format!("version {}", target_version)))?
            .clone();
        let head_id = history
            .branches
            .get(branch_name)
            .map(|b| b.head)
            .ok_or_else(|| VersionError::NotFound(format!("branch {}", branch_name)))?;

        let version = Version {
            id: VersionId::random(),
            file_id: file_id.clone(),
            number: history.next_number(),
            content_hash: target.content_hash,
            size: target.size,
            author: author.clone(),
            timestamp: now_millis(),
            metadata: target.metadata.clone(),
            parents: Parentage::Linear { parent: head_id },
            branch: branch_name.to_string(),
            change_type: ChangeType::Revert,
            description: format!("revert to version {}", target.number),
            merkle_root: None,
            is_head: true,
        };

        if let Some(old_head) = history.find_mut(&head_id) {
            old_head.is_head = false;
        }
        let version = history.advance(branch_name, version);

        self.audit.record(ChangeEvent::now(
            EventKind::VersionReverted,
            Some(file_id.clone()),
            author.clone(),
            format!("reverted {} to version {}", branch_name, target.number),
        ));
        Ok(version)
    }

    /// Compare two versions of the same file.
    pub fn compare_versions(
        &self,
        file_id: &FileId,
        a: &VersionId,
        b: &VersionId,
    ) -> Result<VersionComparison> {
        let files = self.files.read().unwrap();
        let history = files
            .get(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;
        let va = history
            .find(a)
            .ok_or_else(|| VersionError::NotFound(format!("version {}", a)))?;
        let vb = history
            .find(b)
            .ok_or_else(|| VersionError::NotFound(format!("version {}", b)))?;

        Ok(compare(va, vb))
    }

    /// Version history for a file, newest first.
    ///
    /// Optionally filtered to one branch; capped at `limit` entries
    /// (default 50).
    pub fn get_version_history(
        &self,
        file_id: &FileId,
        branch: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Version>> {
        let files = self.files.read().unwrap();
        let history = files
            .get(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;

        let mut versions: Vec<Version> = history
            .versions
            .iter()
            .filter(|v| branch.map_or(true, |b| v.branch == b))
            .cloned()
            .collect();
        versions.sort_by(|x, y| (y.timestamp, y.number).cmp(&(x.timestamp, x.number)));
        versions.truncate(limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
        Ok(versions)
    }

    /// Look up one version by id.
    pub fn get_version(&self, file_id: &FileId, version_id: &VersionId) -> Result<Version> {
        let files = self.files.read().unwrap();
        files
            .get(file_id)
            .and_then(|h| h.find(version_id))
            .cloned()
            .ok_or_else(|| VersionError::NotFound(format!("version {}", version_id)))
    }

    /// All branches of a file.
    pub fn list_branches(&self, file_id: &FileId) -> Result<Vec<Branch>> {
        let files = self.files.read().unwrap();
        let history = files
            .get(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;
        Ok(history.branches.values().cloned().collect())
    }

    /// Whether the engine knows this file.
    pub fn file_exists(&self, file_id: &FileId) -> bool {
        self.files.read().unwrap().contains_key(file_id)
    }

    /// Drop all but the `max` most recent versions by timestamp.
    ///
    /// Opt-in only; never runs automatically. Branch heads always survive.
    /// Returns the number of versions removed.
    pub fn cleanup_old_versions(&self, file_id: &FileId, max: usize) -> Result<usize> {
        let mut files = self.files.write().unwrap();
        let history = files
            .get_mut(file_id)
            .ok_or_else(|| VersionError::NotFound(format!("file {}", file_id)))?;

        let mut by_recency: Vec<(i64, u64, VersionId)> = history
            .versions
            .iter()
            .map(|v| (v.timestamp, v.number, v.id))
            .collect();
        by_recency.sort_by(|x, y| (y.0, y.1).cmp(&(x.0, x.1)));

        let keep: BTreeSet<VersionId> = by_recency.iter().take(max).map(|(_, _, id)| *id).collect();
        let heads: BTreeSet<VersionId> = history.branches.values().map(|b| b.head).collect();

        let before = history.versions.len();
        history
            .versions
            .retain(|v| keep.contains(&v.id) || heads.contains(&v.id));
        let removed = before - history.versions.len();

        if removed > 0 {
            history.anchor_merkle();
            self.audit.record(ChangeEvent::now(
                EventKind::VersionsCleaned,
                Some(file_id.clone()),
                Principal::new("system"),
                format!("removed {} versions, kept {}", removed, history.versions.len()),
            ));
            info!(file = %file_id, removed, "cleaned old versions");
        }
        Ok(removed)
    }
}

fn detect_conflicts(source: &Version, target: &Version) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    if source.content_hash != target.content_hash {
        conflicts.push(Conflict {
            field: "content".to_string(),
            source_value: Some(source.content_hash.to_hex()),
            target_value: Some(target.content_hash.to_hex()),
        });
    }

    let keys: BTreeSet<&String> = source.metadata.keys().chain(target.metadata.keys()).collect();
    for key in keys {
        let sv = source.metadata.get(key);
        let tv = target.metadata.get(key);
        if sv != tv {
            conflicts.push(Conflict {
                field: format!("metadata:{}", key),
                source_value: sv.cloned(),
                target_value: tv.cloned(),
            });
        }
    }

    conflicts
}

/// Stable id for a conflict set: the same heads always produce the same id.
fn conflict_id(file_id: &FileId, source_head: &VersionId, target_head: &VersionId) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"sealdrive-v1 merge conflict");
    hasher.update(file_id.as_str().as_bytes());
    hasher.update(source_head.as_bytes());
    hasher.update(target_head.as_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

fn compare(a: &Version, b: &Version) -> VersionComparison {
    let mut differences = Vec::new();

    let hash_eq = a.content_hash == b.content_hash;
    if !hash_eq {
        differences.push("content differs".to_string());
    }
    if a.size != b.size {
        differences.push(format!("size: {} vs {}", a.size, b.size));
    }

    let keys: BTreeSet<&String> = a.metadata.keys().chain(b.metadata.keys()).collect();
    let distinct_keys = keys.len();
    let mut key_diffs = 0usize;
    for key in keys {
        let av = a.metadata.get(key);
        let bv = b.metadata.get(key);
        if av != bv {
            key_diffs += 1;
            differences.push(format!(
                "metadata:{}: {:?} vs {:?}",
                key,
                av.map(String::as_str),
                bv.map(String::as_str)
            ));
        }
    }

    let size_sim = 1.0 - a.size.abs_diff(b.size) as f64 / a.size.max(b.size).max(1) as f64;
    let meta_sim = if distinct_keys == 0 {
        1.0
    } else {
        1.0 - key_diffs as f64 / distinct_keys as f64
    };
    let similarity = 0.5 * if hash_eq { 1.0 } else { 0.0 } + 0.3 * size_sim + 0.2 * meta_sim;

    VersionComparison {
        version_a: a.id,
        version_b: b.id,
        differences,
        similarity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> VersionControlEngine {
        VersionControlEngine::new(Arc::new(AuditLog::new()))
    }

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn alice() -> Principal {
        Principal::new("alice")
    }

    #[test]
    fn test_initial_version_seeds_main() {
        let engine = engine();
        let file = FileId::new("f1");

        let v1 = engine
            .create_initial_version(&file, b"hello", meta(&[]), &alice())
            .unwrap();
        assert_eq!(v1.number, 1);
        assert_eq!(v1.parents, Parentage::Root);
        assert_eq!(v1.change_type, ChangeType::Create);
        assert!(v1.is_head);
        // Sole version carries the merkle anchor.
        assert_eq!(v1.merkle_root, Some(v1.content_hash));

        let branches = engine.list_branches(&file).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, MAIN_BRANCH);
        assert_eq!(branches[0].head, v1.id);
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"x", meta(&[]), &alice())
            .unwrap();
        let err = engine
            .create_initial_version(&file, b"y", meta(&[]), &alice())
            .unwrap_err();
        assert!(matches!(err, VersionError::AlreadyExists(_)));
    }

    #[test]
    fn test_identical_content_is_metadata_only() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"same bytes", meta(&[]), &alice())
            .unwrap();
        let v2 = engine
            .create_new_version(
                &file,
                b"same bytes",
                meta(&[("label", "v2")]),
                &alice(),
                "relabel",
                None,
            )
            .unwrap();
        assert_eq!(v2.change_type, ChangeType::MetadataOnly);
    }

    #[test]
    fn test_sixty_percent_size_change_is_major() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, &[0u8; 100], meta(&[]), &alice())
            .unwrap();
        // 100 -> 250 bytes: delta ratio 150/250 = 0.6.
        let v2 = engine
            .create_new_version(&file, &[1u8; 250], meta(&[]), &alice(), "grow", None)
            .unwrap();
        assert_eq!(v2.change_type, ChangeType::MajorChange);
    }

    #[test]
    fn test_exactly_one_head_per_branch() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        for i in 2..=5 {
            engine
                .create_new_version(
                    &file,
                    format!("v{}", i).as_bytes(),
                    meta(&[]),
                    &alice(),
                    "edit",
                    None,
                )
                .unwrap();
        }

        let all = engine.get_version_history(&file, None, None).unwrap();
        let heads: Vec<_> = all.iter().filter(|v| v.is_head).collect();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].number, 5);
    }

    #[test]
    fn test_merkle_anchor_moves_to_latest() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        engine
            .create_new_version(&file, b"v2", meta(&[]), &alice(), "edit", None)
            .unwrap();

        let all = engine.get_version_history(&file, None, None).unwrap();
        let anchored: Vec<_> = all.iter().filter(|v| v.merkle_root.is_some()).collect();
        assert_eq!(anchored.len(), 1);
        assert_eq!(anchored[0].number, 2);
    }

    #[test]
    fn test_unknown_branch_is_not_found() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        let err = engine
            .create_new_version(&file, b"v2", meta(&[]), &alice(), "edit", Some("dev"))
            .unwrap_err();
        assert!(matches!(err, VersionError::NotFound(_)));
    }

    #[test]
    fn test_branch_copies_source_head() {
        let engine = engine();
        let file = FileId::new("f1");

        let v1 = engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        let branch = engine.create_branch(&file, MAIN_BRANCH, "dev", &alice()).unwrap();
        assert_eq!(branch.head, v1.id);
        assert_eq!(branch.parent_branch.as_deref(), Some(MAIN_BRANCH));

        let err = engine
            .create_branch(&file, MAIN_BRANCH, "dev", &alice())
            .unwrap_err();
        assert!(matches!(err, VersionError::AlreadyExists(_)));
    }

    #[test]
    fn test_merge_conflict_without_resolution_changes_nothing() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"base", meta(&[]), &alice())
            .unwrap();
        engine.create_branch(&file, MAIN_BRANCH, "dev", &alice()).unwrap();
        engine
            .create_new_version(&file, b"main edit", meta(&[]), &alice(), "m", None)
            .unwrap();
        engine
            .create_new_version(&file, b"dev edit", meta(&[]), &alice(), "d", Some("dev"))
            .unwrap();

        let heads_before: BTreeMap<String, VersionId> = engine
            .list_branches(&file)
            .unwrap()
            .into_iter()
            .map(|b| (b.name, b.head))
            .collect();
        let count_before = engine.get_version_history(&file, None, None).unwrap().len();

        let outcome = engine
            .merge_branches(&file, "dev", MAIN_BRANCH, &alice(), None)
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.version.is_none());
        assert!(outcome.conflicts.iter().any(|c| c.field == "content"));
        assert!(outcome.conflict_id.is_some());

        // All-or-nothing: heads and version count are untouched.
        let heads_after: BTreeMap<String, VersionId> = engine
            .list_branches(&file)
            .unwrap()
            .into_iter()
            .map(|b| (b.name, b.head))
            .collect();
        assert_eq!(heads_before, heads_after);
        assert_eq!(
            engine.get_version_history(&file, None, None).unwrap().len(),
            count_before
        );

        // The same conflicted heads always yield the same conflict id.
        let retry = engine
            .merge_branches(&file, "dev", MAIN_BRANCH, &alice(), None)
            .unwrap();
        assert_eq!(outcome.conflict_id, retry.conflict_id);
    }

    #[test]
    fn test_merge_with_use_source_resolution() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"base", meta(&[]), &alice())
            .unwrap();
        engine.create_branch(&file, MAIN_BRANCH, "dev", &alice()).unwrap();
        engine
            .create_new_version(&file, b"main edit", meta(&[]), &alice(), "m", None)
            .unwrap();
        let dev_head = engine
            .create_new_version(&file, b"dev edit!", meta(&[]), &alice(), "d", Some("dev"))
            .unwrap();

        let outcome = engine
            .merge_branches(
                &file,
                "dev",
                MAIN_BRANCH,
                &alice(),
                Some(MergeResolution {
                    use_source: true,
                    metadata: BTreeMap::new(),
                }),
            )
            .unwrap();
        assert!(outcome.success);

        let merged = outcome.version.unwrap();
        assert_eq!(merged.content_hash, dev_head.content_hash);
        assert_eq!(merged.change_type, ChangeType::Merge);
        assert!(matches!(merged.parents, Parentage::Merge { .. }));
        assert!(merged.is_head);
        assert_eq!(merged.branch, MAIN_BRANCH);

        // The target branch advanced to the merge version.
        let branches = engine.list_branches(&file).unwrap();
        let main = branches.iter().find(|b| b.name == MAIN_BRANCH).unwrap();
        assert_eq!(main.head, merged.id);
    }

    #[test]
    fn test_clean_merge_needs_no_resolution() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"base", meta(&[]), &alice())
            .unwrap();
        engine.create_branch(&file, MAIN_BRANCH, "dev", &alice()).unwrap();
        // Neither branch diverged, so the heads agree on everything.
        let outcome = engine
            .merge_branches(&file, "dev", MAIN_BRANCH, &alice(), None)
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_merge_metadata_conflicts_reported_per_key() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"base", meta(&[("owner", "a")]), &alice())
            .unwrap();
        engine.create_branch(&file, MAIN_BRANCH, "dev", &alice()).unwrap();
        engine
            .create_new_version(&file, b"base", meta(&[("owner", "b")]), &alice(), "m", None)
            .unwrap();

        let outcome = engine
            .merge_branches(&file, "dev", MAIN_BRANCH, &alice(), None)
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.conflicts.iter().any(|c| c.field == "metadata:owner"));
    }

    #[test]
    fn test_revert_creates_new_version() {
        let engine = engine();
        let file = FileId::new("f1");

        let v1 = engine
            .create_initial_version(&file, b"original", meta(&[]), &alice())
            .unwrap();
        engine
            .create_new_version(&file, b"changed a lot more", meta(&[]), &alice(), "edit", None)
            .unwrap();

        let reverted = engine
            .revert_to_version(&file, &v1.id, &alice(), None)
            .unwrap();
        assert_eq!(reverted.number, 3);
        assert_eq!(reverted.content_hash, v1.content_hash);
        assert_eq!(reverted.size, v1.size);
        assert_eq!(reverted.change_type, ChangeType::Revert);

        // Intermediate versions survive.
        assert_eq!(engine.get_version_history(&file, None, None).unwrap().len(), 3);
    }

    #[test]
    fn test_compare_version_with_itself() {
        let engine = engine();
        let file = FileId::new("f1");

        let v1 = engine
            .create_initial_version(&file, b"content", meta(&[("k", "v")]), &alice())
            .unwrap();
        let cmp = engine.compare_versions(&file, &v1.id, &v1.id).unwrap();
        assert!(cmp.differences.is_empty());
        assert!((cmp.similarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compare_reports_differences() {
        let engine = engine();
        let file = FileId::new("f1");

        let v1 = engine
            .create_initial_version(&file, b"aaaa", meta(&[("k", "v1")]), &alice())
            .unwrap();
        let v2 = engine
            .create_new_version(&file, b"bbbbbbbb", meta(&[("k", "v2")]), &alice(), "e", None)
            .unwrap();

        let cmp = engine.compare_versions(&file, &v1.id, &v2.id).unwrap();
        assert!(cmp.similarity < 1.0);
        assert!(cmp.differences.iter().any(|d| d.contains("content")));
        assert!(cmp.differences.iter().any(|d| d.contains("metadata:k")));
    }

    #[test]
    fn test_history_is_newest_first_and_limited() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        for i in 2..=6 {
            engine
                .create_new_version(
                    &file,
                    format!("v{}", i).as_bytes(),
                    meta(&[]),
                    &alice(),
                    "edit",
                    None,
                )
                .unwrap();
        }

        let history = engine.get_version_history(&file, None, Some(3)).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].number, 6);
        assert!(history.windows(2).all(|w| w[0].number > w[1].number));
    }

    #[test]
    fn test_cleanup_keeps_recent_and_heads() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        for i in 2..=6 {
            engine
                .create_new_version(
                    &file,
                    format!("v{}", i).as_bytes(),
                    meta(&[]),
                    &alice(),
                    "edit",
                    None,
                )
                .unwrap();
        }

        let removed = engine.cleanup_old_versions(&file, 2).unwrap();
        assert_eq!(removed, 4);

        let remaining = engine.get_version_history(&file, None, None).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].number, 6);
        // The merkle anchor was recomputed onto the newest survivor.
        let anchored: Vec<_> = remaining.iter().filter(|v| v.merkle_root.is_some()).collect();
        assert_eq!(anchored.len(), 1);
        assert_eq!(anchored[0].number, 6);
    }

    #[test]
    fn test_cleanup_is_opt_in_noop_when_under_limit() {
        let engine = engine();
        let file = FileId::new("f1");

        engine
            .create_initial_version(&file, b"v1", meta(&[]), &alice())
            .unwrap();
        assert_eq!(engine.cleanup_old_versions(&file, 10).unwrap(), 0);
    }

    #[test]
    fn test_unknown_file_errors() {
        let engine = engine();
        let file = FileId::new("missing");

        assert!(!engine.file_exists(&file));
        assert!(matches!(
            engine.create_new_version(&file, b"x", meta(&[]), &alice(), "e", None),
            Err(VersionError::NotFound(_))
        ));
        assert!(matches!(
            engine.list_branches(&file),
            Err(VersionError::NotFound(_))
        ));
    }
}
