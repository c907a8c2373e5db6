//! Sharing links.
//!
//! A sharing link is a named access token with bearer semantics: whoever
//! presents the link id gets the link's permissions on the target file,
//! no principal check. The embedded token still goes through the normal
//! validation path, so expiry and revocation behave exactly like any other
//! token.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use sealdrive_core::{FileId, LinkId, Principal, TokenId};

use crate::error::{Result, TokenError};
use crate::token::Permission;

/// A shareable, bearer-style grant on one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingLink {
    /// The link identifier (also the bearer secret).
    pub link_id: LinkId,

    /// The file this link grants access to.
    pub file_id: FileId,

    /// Id of the embedded token (for revocation).
    pub token_id: TokenId,

    /// The embedded token in wire form.
    pub token: String,

    /// Permissions the link grants.
    pub permissions: BTreeSet<Permission>,

    /// Who created the link.
    pub created_by: Principal,

    /// Creation time (Unix milliseconds).
    pub created_at: i64,

    /// Expiry time (Unix milliseconds).
    pub expires_at: i64,

    /// How many times the link has been successfully presented.
    pub access_count: u64,
}

impl SharingLink {
    /// The scope string carried by this link's token.
    pub fn scope(&self) -> String {
        link_scope(&self.link_id)
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

/// Scope string for a link id: `share_<hex>`.
pub fn link_scope(link_id: &LinkId) -> String {
    format!("share_{}", link_id.to_hex())
}
