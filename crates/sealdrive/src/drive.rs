//! The unified drive facade.
//!
//! Composes the key manager, token service and version engine over one
//! store and one shared audit log. A `Drive` is constructed once per
//! process/tenant and passed by reference; it holds no global state.
//!
//! Mutations on the same file id are serialized through a per-file lock so
//! concurrent writers cannot race the head pointer or the wrapped-key set;
//! distinct files proceed concurrently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, info};

use sealdrive_core::{
    verify_content, AuditLog, ChangeEvent, ContentHash, EventKind, ExpectedContent, FileId,
    IntegrityReport, LinkId, Principal, TokenId, VersionId,
};
use sealdrive_keys::{EncryptedPayload, KeyManager};
use sealdrive_store::KvStore;
use sealdrive_tokens::{
    AccessToken, FilePermissionSet, Permission, SharingLink, TokenPayload, TokenService,
};
use sealdrive_versions::{
    Branch, MergeOutcome, MergeResolution, Version, VersionComparison, VersionControlEngine,
    MAIN_BRANCH,
};

use crate::error::{DriveError, Result};

/// Decrypted content returned by [`Drive::read_file`].
#[derive(Debug)]
pub struct FileContent {
    /// The plaintext bytes.
    pub bytes: Bytes,

    /// The version the bytes were read at.
    pub version: Version,

    /// Advisory integrity check against the version record.
    pub report: IntegrityReport,
}

/// The encrypted file sharing core.
pub struct Drive<S: KvStore + Clone> {
    store: S,
    keys: KeyManager<S>,
    tokens: TokenService<S>,
    versions: VersionControlEngine,
    audit: Arc<AuditLog>,

    /// Per-file mutation locks.
    file_locks: Mutex<HashMap<FileId, Arc<Mutex<()>>>>,
}

impl<S: KvStore + Clone> Drive<S> {
    /// Open a drive over the given store.
    pub fn open(store: S) -> Result<Self> {
        let audit = Arc::new(AuditLog::new());
        let keys = KeyManager::open(store.clone())?;
        let tokens = TokenService::open(store.clone(), Arc::clone(&audit))?;
        let versions = VersionControlEngine::new(Arc::clone(&audit));

        Ok(Self {
            store,
            keys,
            tokens,
            versions,
            audit,
            file_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The shared audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn file_lock(&self, file_id: &FileId) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().unwrap();
        locks
            .entry(file_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ────────────────────────────────────────────────────────────────────
    // File lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Create a new file: derive and wrap the owner's key, encrypt the
    /// content, record version 1 and seed the ACL.
    pub fn create_file(
        &self,
        file_id: &FileId,
        content: &[u8],
        metadata: BTreeMap<String, String>,
        owner: &Principal,
    ) -> Result<Version> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();

        if self.versions.file_exists(file_id) {
            return Err(DriveError::Versions(
                sealdrive_versions::VersionError::AlreadyExists(format!("file {}", file_id)),
            ));
        }

        let key = self.keys.derive_file_key(file_id, owner);
        self.keys.wrap_key(file_id, owner, &key)?;
        self.audit.record(ChangeEvent::now(
            EventKind::KeyWrapped,
            Some(file_id.clone()),
            owner.clone(),
            format!("owner key wrapped for {}", owner),
        ));

        let payload = EncryptedPayload::encrypt(content, &key)?;
        let version = self
            .versions
            .create_initial_version(file_id, content, metadata, owner)?;
        self.store
            .set(&content_path(file_id, &version.content_hash), &payload.to_bytes())?;

        self.tokens.create_file_acl(file_id, owner)?;

        info!(file = %file_id, owner = %owner, "created file");
        Ok(version)
    }

    /// Commit new content to a branch (default `main`).
    ///
    /// The author must hold a wrapped key for the file; without one the
    /// operation fails exactly like any other missing-key case.
    pub fn update_file(
        &self,
        file_id: &FileId,
        content: &[u8],
        metadata: BTreeMap<String, String>,
        author: &Principal,
        description: &str,
        branch: Option<&str>,
    ) -> Result<Version> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();

        let key = self.keys.unwrap_key(file_id, author)?;
        let payload = EncryptedPayload::encrypt(content, &key)?;

        let version = self.versions.create_new_version(
            file_id,
            content,
            metadata,
            author,
            description,
            branch,
        )?;
        self.store
            .set(&content_path(file_id, &version.content_hash), &payload.to_bytes())?;

        debug!(file = %file_id, number = version.number, "updated file");
        Ok(version)
    }

    /// Read and decrypt a file at a version (default: the `main` head).
    ///
    /// The returned report is advisory; a low score asks the caller to
    /// confirm with the user, it never blocks the read.
    pub fn read_file(
        &self,
        file_id: &FileId,
        principal: &Principal,
        version_id: Option<&VersionId>,
    ) -> Result<FileContent> {
        let key = self.keys.unwrap_key(file_id, principal)?;

        let version = match version_id {
            Some(id) => self.versions.get_version(file_id, id)?,
            None => self.head_version(file_id, MAIN_BRANCH)?,
        };

        let bytes = self
            .store
            .get(&content_path(file_id, &version.content_hash))?
            .ok_or_else(|| DriveError::NotFound(format!("content for version {}", version.id)))?;
        let payload = EncryptedPayload::from_bytes(&bytes)?;
        let plaintext = payload.decrypt(&key)?;

        let expected = ExpectedContent::new(version.size, version.content_hash);
        let report = verify_content(&plaintext, &expected);

        Ok(FileContent {
            bytes: Bytes::from(plaintext),
            version,
            report,
        })
    }

    fn head_version(&self, file_id: &FileId, branch: &str) -> Result<Version> {
        let head = self
            .versions
            .list_branches(file_id)?
            .into_iter()
            .find(|b| b.name == branch)
            .map(|b| b.head)
            .ok_or_else(|| DriveError::NotFound(format!("branch {}", branch)))?;
        Ok(self.versions.get_version(file_id, &head)?)
    }

    // ────────────────────────────────────────────────────────────────────
    // Sharing
    // ────────────────────────────────────────────────────────────────────

    /// Grant a principal access to a file.
    ///
    /// Wraps the file's content key for the grantee and records the ACL
    /// grant. The actor must hold `share` on the file and a wrapped key of
    /// their own to re-wrap from.
    pub fn grant_access(
        &self,
        file_id: &FileId,
        grantee: &Principal,
        permissions: &BTreeSet<Permission>,
        actor: &Principal,
    ) -> Result<()> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();

        let acl = self
            .tokens
            .file_permissions(file_id)?
            .ok_or_else(|| DriveError::NotFound(format!("file {}", file_id)))?;
        if !acl.allows(actor, Permission::Share) {
            return Err(DriveError::AccessDenied);
        }

        let key = self.keys.unwrap_key(file_id, actor)?;
        self.keys.wrap_key(file_id, grantee, &key)?;
        self.audit.record(ChangeEvent::now(
            EventKind::KeyWrapped,
            Some(file_id.clone()),
            actor.clone(),
            format!("key wrapped for {}", grantee),
        ));

        self.tokens
            .grant_file_permissions(file_id, grantee, permissions, actor)?;
        info!(file = %file_id, grantee = %grantee, "granted access");
        Ok(())
    }

    /// Revoke a principal's access to a file.
    ///
    /// Deletes their wrapped key and their ACL entry. The owner cannot be
    /// revoked; other principals' copies are untouched.
    pub fn revoke_access(
        &self,
        file_id: &FileId,
        principal: &Principal,
        actor: &Principal,
    ) -> Result<()> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();

        let acl = self
            .tokens
            .file_permissions(file_id)?
            .ok_or_else(|| DriveError::NotFound(format!("file {}", file_id)))?;
        if !acl.allows(actor, Permission::Share) {
            return Err(DriveError::AccessDenied);
        }
        if *principal == acl.owner {
            return Err(DriveError::AccessDenied);
        }

        self.keys.revoke_key(file_id, principal)?;
        self.audit.record(ChangeEvent::now(
            EventKind::KeyRevoked,
            Some(file_id.clone()),
            actor.clone(),
            format!("key revoked for {}", principal),
        ));

        let granted = acl.granted_to(principal);
        if !granted.is_empty() {
            self.tokens
                .revoke_file_permissions(file_id, principal, &granted, actor)?;
        }
        info!(file = %file_id, principal = %principal, "revoked access");
        Ok(())
    }

    /// Principals currently holding a wrapped copy of a file's key.
    pub fn key_holders(&self, file_id: &FileId) -> Result<Vec<Principal>> {
        Ok(self.keys.wrapped_principals(file_id)?)
    }

    /// The file's permission set, if the file has one.
    pub fn file_permissions(&self, file_id: &FileId) -> Result<Option<FilePermissionSet>> {
        Ok(self.tokens.file_permissions(file_id)?)
    }

    // ────────────────────────────────────────────────────────────────────
    // Tokens and links
    // ────────────────────────────────────────────────────────────────────

    /// Issue a capability token.
    pub fn issue_token(
        &self,
        principal: &Principal,
        permissions: BTreeSet<Permission>,
        ttl_millis: Option<i64>,
    ) -> Result<AccessToken> {
        Ok(self.tokens.issue_token(principal, permissions, ttl_millis)?)
    }

    /// Validate a token in wire form. Fails closed.
    pub fn validate_token(&self, token: &str) -> Option<TokenPayload> {
        self.tokens.validate_token(token)
    }

    /// Revoke a token by id.
    pub fn revoke_token(&self, token_id: &TokenId) -> Result<()> {
        Ok(self.tokens.revoke_token(token_id)?)
    }

    /// Check a token's permission on a file. Fails closed.
    pub fn has_permission(&self, token: &str, file_id: &FileId, permission: Permission) -> bool {
        self.tokens.has_permission(token, file_id, permission)
    }

    /// Create a bearer sharing link for a file.
    pub fn create_sharing_link(
        &self,
        file_id: &FileId,
        permissions: BTreeSet<Permission>,
        ttl_millis: Option<i64>,
        actor: &Principal,
    ) -> Result<SharingLink> {
        Ok(self
            .tokens
            .create_sharing_link(file_id, permissions, ttl_millis, actor)?)
    }

    /// Present a sharing link. Fails closed.
    pub fn validate_sharing_link(&self, link_id: &LinkId) -> Option<SharingLink> {
        self.tokens.validate_sharing_link(link_id)
    }

    /// Revoke a sharing link.
    pub fn revoke_sharing_link(&self, link_id: &LinkId) -> Result<()> {
        Ok(self.tokens.revoke_sharing_link(link_id)?)
    }

    // ────────────────────────────────────────────────────────────────────
    // Versioning
    // ────────────────────────────────────────────────────────────────────

    /// Fork a branch from an existing one.
    pub fn create_branch(
        &self,
        file_id: &FileId,
        source: &str,
        new_name: &str,
        author: &Principal,
    ) -> Result<Branch> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();
        Ok(self.versions.create_branch(file_id, source, new_name, author)?)
    }

    /// Merge one branch into another.
    ///
    /// All-or-nothing: conflicts without a resolution mutate nothing.
    pub fn merge_branches(
        &self,
        file_id: &FileId,
        source: &str,
        target: &str,
        author: &Principal,
        resolution: Option<MergeResolution>,
    ) -> Result<MergeOutcome> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();
        Ok(self
            .versions
            .merge_branches(file_id, source, target, author, resolution)?)
    }

    /// Roll a branch back to an earlier version's content.
    pub fn revert_to_version(
        &self,
        file_id: &FileId,
        target_version: &VersionId,
        author: &Principal,
        branch: Option<&str>,
    ) -> Result<Version> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();
        Ok(self
            .versions
            .revert_to_version(file_id, target_version, author, branch)?)
    }

    /// Compare two versions of a file.
    pub fn compare_versions(
        &self,
        file_id: &FileId,
        a: &VersionId,
        b: &VersionId,
    ) -> Result<VersionComparison> {
        Ok(self.versions.compare_versions(file_id, a, b)?)
    }

    /// Version history, newest first.
    pub fn version_history(
        &self,
        file_id: &FileId,
        branch: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Version>> {
        Ok(self.versions.get_version_history(file_id, branch, limit)?)
    }

    /// Look up one version.
    pub fn get_version(&self, file_id: &FileId, version_id: &VersionId) -> Result<Version> {
        Ok(self.versions.get_version(file_id, version_id)?)
    }

    /// All branches of a file.
    pub fn list_branches(&self, file_id: &FileId) -> Result<Vec<Branch>> {
        Ok(self.versions.list_branches(file_id)?)
    }

    /// Whether the drive knows this file.
    pub fn file_exists(&self, file_id: &FileId) -> bool {
        self.versions.file_exists(file_id)
    }

    /// Drop all but the `max` most recent versions of a file. Opt-in only.
    pub fn cleanup_old_versions(&self, file_id: &FileId, max: usize) -> Result<usize> {
        let lock = self.file_lock(file_id);
        let _guard = lock.lock().unwrap();
        Ok(self.versions.cleanup_old_versions(file_id, max)?)
    }
}

/// Ciphertext is content-addressed: reverts and merges that reuse an
/// earlier hash find their payload without re-encryption.
fn content_path(file_id: &FileId, hash: &ContentHash) -> String {
    format!("content/{}/{}", hex::encode(file_id.as_str()), hash.to_hex())
}
