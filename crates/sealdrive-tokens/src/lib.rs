//! # Sealdrive Tokens
//!
//! The capability token service: signed, scoped, expiring proofs of
//! permission, with a side revocation registry.
//!
//! ## Token model
//!
//! A token is self-contained (`header.payload.mac` over canonical CBOR), so
//! validity can be checked without a lookup — but revocation still requires
//! the registry, keyed by token id. A token is valid iff its registry entry
//! is active, it has not expired, and the MAC verifies under a secret
//! derived from the claimed principal.
//!
//! All validation failures collapse to "not authorized": malformed bytes,
//! an unknown or revoked id, expiry and a bad MAC are indistinguishable to
//! callers, so token lifecycle state never leaks to an attacker.
//!
//! Permission checks are conjunctive: holding a token never bypasses the
//! per-file ACL ([`FilePermissionSet`]).

pub mod acl;
pub mod error;
pub mod link;
pub mod registry;
pub mod service;
pub mod token;

pub use acl::FilePermissionSet;
pub use error::{Result, TokenError};
pub use link::SharingLink;
pub use registry::{RegistryEntry, TokenRegistry};
pub use service::TokenService;
pub use token::{AccessToken, Permission, TokenHeader, TokenMac, TokenPayload};
