//! Per-file access control lists.
//!
//! The ACL is the stateful half of authorization: a token asserts what a
//! principal may do, the ACL records what they were actually granted.
//! Both must agree before access is allowed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use sealdrive_core::{FileId, Principal};

use crate::error::{Result, TokenError};
use crate::token::Permission;

/// Permissions granted on one file.
///
/// Owned by the file's creator; mutated only through the token service's
/// grant/revoke operations, which also append audit events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermissionSet {
    /// The file these permissions cover.
    pub file_id: FileId,

    /// The creator. Always allowed everything.
    pub owner: Principal,

    /// Granted permissions per principal.
    pub users: BTreeMap<Principal, BTreeSet<Permission>>,
}

impl FilePermissionSet {
    /// Seed a new permission set for a freshly created file.
    pub fn new(file_id: FileId, owner: Principal) -> Self {
        Self {
            file_id,
            owner,
            users: BTreeMap::new(),
        }
    }

    /// Add permissions for a principal.
    pub fn grant(&mut self, principal: &Principal, permissions: &BTreeSet<Permission>) {
        self.users
            .entry(principal.clone())
            .or_default()
            .extend(permissions.iter().copied());
    }

    /// Remove the listed permissions for a principal.
    ///
    /// Dropping the last permission removes the principal's entry entirely.
    pub fn revoke(&mut self, principal: &Principal, permissions: &BTreeSet<Permission>) {
        if let Some(granted) = self.users.get_mut(principal) {
            for perm in permissions {
                granted.remove(perm);
            }
            if granted.is_empty() {
                self.users.remove(principal);
            }
        }
    }

    /// Remove every permission for a principal.
    pub fn revoke_all(&mut self, principal: &Principal) {
        self.users.remove(principal);
    }

    /// Whether a principal holds a permission on this file.
    ///
    /// The owner passes every check; an `Admin` grant implies everything.
    pub fn allows(&self, principal: &Principal, permission: Permission) -> bool {
        if *principal == self.owner {
            return true;
        }
        match self.users.get(principal) {
            Some(granted) => {
                granted.contains(&Permission::Admin) || granted.contains(&permission)
            }
            None => false,
        }
    }

    /// Permissions currently granted to a principal (empty for strangers).
    pub fn granted_to(&self, principal: &Principal) -> BTreeSet<Permission> {
        self.users.get(principal).cloned().unwrap_or_default()
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| TokenError::Serialization(e.to_string()))
    }
}
