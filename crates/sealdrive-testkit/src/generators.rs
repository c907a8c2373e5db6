//! Proptest generators for property-based testing.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use sealdrive_core::{ContentHash, FileId, Principal, VersionId};
use sealdrive_tokens::Permission;

/// Generate an opaque principal string (wallet-address-ish).
pub fn principal() -> impl Strategy<Value = Principal> {
    "[a-zA-Z0-9:/_-]{1,48}".prop_map(Principal::new)
}

/// Generate a file id, including ids with separators in them.
pub fn file_id() -> impl Strategy<Value = FileId> {
    "[a-zA-Z0-9._/-]{1,64}".prop_map(FileId::new)
}

/// Generate a random version id.
pub fn version_id() -> impl Strategy<Value = VersionId> {
    any::<[u8; 32]>().prop_map(VersionId::from_bytes)
}

/// Generate a random content hash.
pub fn content_hash() -> impl Strategy<Value = ContentHash> {
    any::<[u8; 32]>().prop_map(ContentHash::from_bytes)
}

/// Generate one permission.
pub fn permission() -> impl Strategy<Value = Permission> {
    prop_oneof![
        Just(Permission::Read),
        Just(Permission::Write),
        Just(Permission::Delete),
        Just(Permission::Share),
        Just(Permission::Admin),
    ]
}

/// Generate a non-empty permission set.
pub fn permission_set() -> impl Strategy<Value = BTreeSet<Permission>> {
    prop::collection::btree_set(permission(), 1..=5)
}

/// Generate a metadata map.
pub fn metadata() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z][a-z0-9-]{0,15}", "[ -~]{0,32}", 0..=6)
}

/// Generate content bytes, biased toward the edge cases: empty blobs and
/// multi-byte UTF-8 alongside arbitrary binary.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        "[\\PC]{1,64}".prop_map(String::into_bytes),
        prop::collection::vec(any::<u8>(), 1..=max_len),
    ]
}

/// Generate a reasonable timestamp (Unix milliseconds).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}
