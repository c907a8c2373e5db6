//! The capability token service.
//!
//! Issues, validates and revokes tokens; owns the per-file ACLs and the
//! sharing-link lifecycle. Constructed once per process/tenant over a
//! key-value store and a shared audit log.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, warn};

use sealdrive_core::{now_millis, AuditLog, ChangeEvent, EventKind, FileId, LinkId, Principal, TokenId};
use sealdrive_store::KvStore;

use crate::acl::FilePermissionSet;
use crate::error::{Result, TokenError};
use crate::link::{link_scope, SharingLink};
use crate::registry::TokenRegistry;
use crate::token::{AccessToken, Permission, TokenPayload};

/// Default token lifetime: 24 hours.
pub const DEFAULT_TTL_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Store key for the persisted service secret.
const SERVICE_SECRET_KEY: &str = "tokens/secret";

/// Derivation context for per-principal MAC keys.
const MAC_KEY_CONTEXT: &str = "sealdrive-v1 token mac";

/// The secret all MAC keys are derived from.
struct ServiceSecret([u8; 32]);

impl Drop for ServiceSecret {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

/// Issues and validates capability tokens; manages file ACLs and links.
pub struct TokenService<S: KvStore + Clone> {
    store: S,
    registry: TokenRegistry<S>,
    secret: ServiceSecret,
    audit: Arc<AuditLog>,
}

impl<S: KvStore + Clone> TokenService<S> {
    /// Open the service, loading or creating the signing secret.
    pub fn open(store: S, audit: Arc<AuditLog>) -> Result<Self> {
        let secret = match store.get(SERVICE_SECRET_KEY)? {
            Some(bytes) if bytes.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                ServiceSecret(arr)
            }
            Some(_) => return Err(TokenError::Serialization("malformed service secret".into())),
            None => {
                let mut arr = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut arr);
                store.set(SERVICE_SECRET_KEY, &arr)?;
                debug!("generated new token service secret");
                ServiceSecret(arr)
            }
        };

        let registry = TokenRegistry::new(store.clone());

        Ok(Self {
            store,
            registry,
            secret,
            audit,
        })
    }

    /// Per-principal MAC key.
    fn mac_key(&self, principal: &Principal) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key(MAC_KEY_CONTEXT);
        hasher.update(&self.secret.0);
        hasher.update(principal.as_bytes());
        *hasher.finalize().as_bytes()
    }

    // ────────────────────────────────────────────────────────────────────
    // Token lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Issue a signed token for a principal.
    pub fn issue_token(
        &self,
        principal: &Principal,
        permissions: BTreeSet<Permission>,
        ttl_millis: Option<i64>,
    ) -> Result<AccessToken> {
        self.issue_scoped(principal, permissions, ttl_millis, "api".to_string())
    }

    fn issue_scoped(
        &self,
        principal: &Principal,
        permissions: BTreeSet<Permission>,
        ttl_millis: Option<i64>,
        scope: String,
    ) -> Result<AccessToken> {
        let now = now_millis();
        let payload = TokenPayload {
            token_id: TokenId::random(),
            principal: principal.clone(),
            permissions,
            issued_at: now,
            expires_at: now + ttl_millis.unwrap_or(DEFAULT_TTL_MILLIS),
            scope,
        };

        let token = AccessToken::sign(payload, &self.mac_key(principal));
        self.registry.register(&token.payload.token_id, now)?;

        self.audit.record(ChangeEvent::now(
            EventKind::TokenIssued,
            None,
            principal.clone(),
            format!("token {} scope {}", token.payload.token_id, token.payload.scope),
        ));

        Ok(token)
    }

    /// Validate a token in wire form.
    ///
    /// Fails closed: malformed structure, a MAC mismatch, an unknown or
    /// inactive registry entry, and expiry all return `None`. Expiry
    /// additionally marks the registry entry inactive (terminal), so the
    /// caller cannot tell an expired token from a revoked one afterwards.
    ///
    /// The MAC is checked before anything touches the registry: claims in
    /// an unverified payload must not drive state changes, or a forgery
    /// carrying a known token id could retire the genuine token.
    pub fn validate_token(&self, token: &str) -> Option<TokenPayload> {
        let parsed = AccessToken::decode(token).ok()?;

        if !parsed.verify(&self.mac_key(&parsed.payload.principal)) {
            return None;
        }

        let active = self.registry.is_active(&parsed.payload.token_id).ok()?;
        if !active {
            return None;
        }

        let now = now_millis();
        if now >= parsed.payload.expires_at {
            if let Err(e) = self.registry.deactivate(&parsed.payload.token_id, now) {
                warn!(token = %parsed.payload.token_id, error = %e, "failed to retire expired token");
            }
            return None;
        }

        Some(parsed.payload)
    }

    /// Revoke a token by id. Terminal and idempotent.
    pub fn revoke_token(&self, token_id: &TokenId) -> Result<()> {
        self.registry.deactivate(token_id, now_millis())?;
        debug!(token = %token_id, "revoked token");
        Ok(())
    }

    /// Check a token's permission on a file.
    ///
    /// Conjunctive: the token must be valid AND assert the permission AND
    /// the file's ACL must grant that principal the permission. A token
    /// never bypasses the file-level grant.
    pub fn has_permission(&self, token: &str, file_id: &FileId, permission: Permission) -> bool {
        let payload = match self.validate_token(token) {
            Some(p) => p,
            None => return false,
        };

        if !payload.asserts(permission) {
            return false;
        }

        match self.file_permissions(file_id) {
            Ok(Some(acl)) => acl.allows(&payload.principal, permission),
            _ => false,
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // File ACLs
    // ────────────────────────────────────────────────────────────────────

    /// Seed the ACL for a freshly created file.
    ///
    /// Returns the existing set unchanged if one is already present.
    pub fn create_file_acl(&self, file_id: &FileId, owner: &Principal) -> Result<FilePermissionSet> {
        if let Some(existing) = self.file_permissions(file_id)? {
            return Ok(existing);
        }

        let acl = FilePermissionSet::new(file_id.clone(), owner.clone());
        self.store.set(&acl_path(file_id), &acl.to_bytes())?;
        Ok(acl)
    }

    /// Load the ACL for a file.
    pub fn file_permissions(&self, file_id: &FileId) -> Result<Option<FilePermissionSet>> {
        match self.store.get(&acl_path(file_id))? {
            Some(bytes) => Ok(Some(FilePermissionSet::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Grant permissions on a file and record the change.
    pub fn grant_file_permissions(
        &self,
        file_id: &FileId,
        principal: &Principal,
        permissions: &BTreeSet<Permission>,
        actor: &Principal,
    ) -> Result<()> {
        let mut acl = self
            .file_permissions(file_id)?
            .ok_or_else(|| TokenError::NotFound(format!("file {}", file_id)))?;

        acl.grant(principal, permissions);
        self.store.set(&acl_path(file_id), &acl.to_bytes())?;

        self.audit.record(ChangeEvent::now(
            EventKind::PermissionGranted,
            Some(file_id.clone()),
            actor.clone(),
            format!("granted {:?} to {}", permissions, principal),
        ));
        debug!(file = %file_id, principal = %principal, "granted permissions");
        Ok(())
    }

    /// Revoke permissions on a file and record the change.
    pub fn revoke_file_permissions(
        &self,
        file_id: &FileId,
        principal: &Principal,
        permissions: &BTreeSet<Permission>,
        actor: &Principal,
    ) -> Result<()> {
        let mut acl = self
            .file_permissions(file_id)?
            .ok_or_else(|| TokenError::NotFound(format!("file {}", file_id)))?;

        acl.revoke(principal, permissions);
        self.store.set(&acl_path(file_id), &acl.to_bytes())?;

        self.audit.record(ChangeEvent::now(
            EventKind::PermissionRevoked,
            Some(file_id.clone()),
            actor.clone(),
            format!("revoked {:?} from {}", permissions, principal),
        ));
        debug!(file = %file_id, principal = %principal, "revoked permissions");
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Sharing links
    // ────────────────────────────────────────────────────────────────────

    /// Create a bearer sharing link for a file.
    ///
    /// The actor must hold `share` on the file (owner and admins qualify).
    pub fn create_sharing_link(
        &self,
        file_id: &FileId,
        permissions: BTreeSet<Permission>,
        ttl_millis: Option<i64>,
        actor: &Principal,
    ) -> Result<SharingLink> {
        let acl = self
            .file_permissions(file_id)?
            .ok_or_else(|| TokenError::NotFound(format!("file {}", file_id)))?;
        if !acl.allows(actor, Permission::Share) {
            return Err(TokenError::Unauthorized);
        }

        let link_id = LinkId::random();
        let token = self.issue_scoped(
            actor,
            permissions.clone(),
            ttl_millis,
            link_scope(&link_id),
        )?;

        let link = SharingLink {
            link_id,
            file_id: file_id.clone(),
            token_id: token.payload.token_id,
            token: token.encode(),
            permissions,
            created_by: actor.clone(),
            created_at: token.payload.issued_at,
            expires_at: token.payload.expires_at,
            access_count: 0,
        };

        self.store.set(&link_path(&link_id), &link.to_bytes())?;

        self.audit.record(ChangeEvent::now(
            EventKind::LinkCreated,
            Some(file_id.clone()),
            actor.clone(),
            format!("sharing link {}", link_id),
        ));
        Ok(link)
    }

    /// Present a sharing link (bearer semantics: no principal check).
    ///
    /// Increments the access counter on success; fails closed on expiry or
    /// revocation of the embedded token, exactly like `validate_token`.
    pub fn validate_sharing_link(&self, link_id: &LinkId) -> Option<SharingLink> {
        let bytes = self.store.get(&link_path(link_id)).ok()??;
        let mut link = SharingLink::from_bytes(&bytes).ok()?;

        self.validate_token(&link.token)?;

        link.access_count += 1;
        if self
            .store
            .set(&link_path(link_id), &link.to_bytes())
            .is_err()
        {
            return None;
        }

        self.audit.record(ChangeEvent::now(
            EventKind::LinkAccessed,
            Some(link.file_id.clone()),
            link.created_by.clone(),
            format!("sharing link {} access #{}", link_id, link.access_count),
        ));
        Some(link)
    }

    /// Revoke a sharing link by retiring its embedded token.
    pub fn revoke_sharing_link(&self, link_id: &LinkId) -> Result<()> {
        let bytes = self
            .store
            .get(&link_path(link_id))?
            .ok_or_else(|| TokenError::NotFound(format!("link {}", link_id)))?;
        let link = SharingLink::from_bytes(&bytes)?;

        self.revoke_token(&link.token_id)?;

        self.audit.record(ChangeEvent::now(
            EventKind::TokenRevoked,
            Some(link.file_id.clone()),
            link.created_by.clone(),
            format!("sharing link {} revoked", link_id),
        ));
        Ok(())
    }
}

fn acl_path(file_id: &FileId) -> String {
    format!("acl/{}", hex::encode(file_id.as_str()))
}

fn link_path(link_id: &LinkId) -> String {
    format!("links/{}", link_id.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdrive_store::MemoryStore;

    fn service() -> TokenService<Arc<MemoryStore>> {
        TokenService::open(Arc::new(MemoryStore::new()), Arc::new(AuditLog::new())).unwrap()
    }

    fn perms(list: &[Permission]) -> BTreeSet<Permission> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_issue_and_validate() {
        let svc = service();
        let alice = Principal::new("alice");

        let token = svc
            .issue_token(&alice, perms(&[Permission::Read]), None)
            .unwrap();
        let wire = token.encode();

        let payload = svc.validate_token(&wire).unwrap();
        assert_eq!(payload.principal, alice);
        assert!(payload.asserts(Permission::Read));
        assert!(!payload.asserts(Permission::Write));
    }

    #[test]
    fn test_expired_token_fails_immediately() {
        let svc = service();
        let alice = Principal::new("alice");

        // TTL of -1ms: expires_at is already in the past.
        let token = svc
            .issue_token(&alice, perms(&[Permission::Read]), Some(-1))
            .unwrap();

        assert!(svc.validate_token(&token.encode()).is_none());

        // First validation after expiry retired the registry entry.
        let entry = svc.registry.get(&token.payload.token_id).unwrap().unwrap();
        assert!(!entry.active);
    }

    #[test]
    fn test_revoked_token_fails_like_expired() {
        let svc = service();
        let alice = Principal::new("alice");

        let token = svc
            .issue_token(&alice, perms(&[Permission::Read]), None)
            .unwrap();
        let wire = token.encode();
        assert!(svc.validate_token(&wire).is_some());

        svc.revoke_token(&token.payload.token_id).unwrap();

        // Same generic outcome as any other failure: None.
        assert!(svc.validate_token(&wire).is_none());
    }

    #[test]
    fn test_forged_token_fails() {
        let svc = service();
        let alice = Principal::new("alice");

        let token = svc
            .issue_token(&alice, perms(&[Permission::Read]), None)
            .unwrap();

        // Escalate permissions and re-sign under a guessed key.
        let mut payload = token.payload.clone();
        payload.permissions.insert(Permission::Admin);
        let forged = AccessToken::sign(payload, &[0u8; 32]);

        assert!(svc.validate_token(&forged.encode()).is_none());
    }

    #[test]
    fn test_forged_expiry_cannot_retire_genuine_token() {
        let svc = service();
        let alice = Principal::new("alice");

        let token = svc
            .issue_token(&alice, perms(&[Permission::Read]), None)
            .unwrap();
        let wire = token.encode();

        // Reuse the real token id but claim it is long expired, signed
        // under a guessed key.
        let mut payload = token.payload.clone();
        payload.expires_at = 0;
        let forged = AccessToken::sign(payload, &[0u8; 32]);

        assert!(svc.validate_token(&forged.encode()).is_none());

        // The genuine token must be untouched: still active and valid.
        let entry = svc.registry.get(&token.payload.token_id).unwrap().unwrap();
        assert!(entry.active);
        assert!(svc.validate_token(&wire).is_some());
    }

    #[test]
    fn test_validate_garbage_is_none() {
        let svc = service();
        assert!(svc.validate_token("").is_none());
        assert!(svc.validate_token("not a token").is_none());
        assert!(svc.validate_token("aa.bb.cc").is_none());
    }

    #[test]
    fn test_has_permission_is_conjunctive() {
        let svc = service();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        let file = FileId::new("f1");

        svc.create_file_acl(&file, &alice).unwrap();

        // Bob has a token asserting read, but no ACL grant: denied.
        let bob_token = svc
            .issue_token(&bob, perms(&[Permission::Read]), None)
            .unwrap()
            .encode();
        assert!(!svc.has_permission(&bob_token, &file, Permission::Read));

        // After the ACL grant, the same token passes.
        svc.grant_file_permissions(&file, &bob, &perms(&[Permission::Read]), &alice)
            .unwrap();
        assert!(svc.has_permission(&bob_token, &file, Permission::Read));

        // The ACL grant alone is not enough for permissions the token
        // does not assert.
        assert!(!svc.has_permission(&bob_token, &file, Permission::Write));
    }

    #[test]
    fn test_admin_token_still_needs_acl() {
        let svc = service();
        let alice = Principal::new("alice");
        let mallory = Principal::new("mallory");
        let file = FileId::new("f1");

        svc.create_file_acl(&file, &alice).unwrap();

        let mallory_token = svc
            .issue_token(&mallory, perms(&[Permission::Admin]), None)
            .unwrap()
            .encode();
        assert!(!svc.has_permission(&mallory_token, &file, Permission::Read));
    }

    #[test]
    fn test_grant_revoke_appends_audit_events() {
        let audit = Arc::new(AuditLog::new());
        let svc = TokenService::open(Arc::new(MemoryStore::new()), Arc::clone(&audit)).unwrap();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        let file = FileId::new("f1");

        svc.create_file_acl(&file, &alice).unwrap();
        svc.grant_file_permissions(&file, &bob, &perms(&[Permission::Read]), &alice)
            .unwrap();
        svc.revoke_file_permissions(&file, &bob, &perms(&[Permission::Read]), &alice)
            .unwrap();

        let events = audit.events_for(&file);
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::PermissionGranted));
        assert!(kinds.contains(&EventKind::PermissionRevoked));
    }

    #[test]
    fn test_sharing_link_lifecycle() {
        let svc = service();
        let alice = Principal::new("alice");
        let file = FileId::new("f1");

        svc.create_file_acl(&file, &alice).unwrap();

        let link = svc
            .create_sharing_link(&file, perms(&[Permission::Read]), None, &alice)
            .unwrap();
        assert_eq!(link.access_count, 0);
        assert!(link.scope().starts_with("share_"));

        // Bearer validation: link id alone, counter increments.
        let first = svc.validate_sharing_link(&link.link_id).unwrap();
        assert_eq!(first.access_count, 1);
        let second = svc.validate_sharing_link(&link.link_id).unwrap();
        assert_eq!(second.access_count, 2);

        // Revocation fails closed.
        svc.revoke_sharing_link(&link.link_id).unwrap();
        assert!(svc.validate_sharing_link(&link.link_id).is_none());
    }

    #[test]
    fn test_sharing_link_requires_share_permission() {
        let svc = service();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");
        let file = FileId::new("f1");

        svc.create_file_acl(&file, &alice).unwrap();

        let err = svc
            .create_sharing_link(&file, perms(&[Permission::Read]), None, &bob)
            .unwrap_err();
        assert!(matches!(err, TokenError::Unauthorized));

        // Granting share fixes it.
        svc.grant_file_permissions(&file, &bob, &perms(&[Permission::Share]), &alice)
            .unwrap();
        assert!(svc
            .create_sharing_link(&file, perms(&[Permission::Read]), None, &bob)
            .is_ok());
    }

    #[test]
    fn test_unknown_link_is_none() {
        let svc = service();
        assert!(svc.validate_sharing_link(&LinkId::random()).is_none());
    }
}
