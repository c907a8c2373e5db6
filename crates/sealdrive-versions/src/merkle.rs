//! Merkle anchoring over a file's version history.
//!
//! The root commits to every version's content hash in order, so a single
//! stored value lets an auditor detect any tampered or missing version.

use sealdrive_core::ContentHash;

/// Compute the merkle root over the given leaf hashes.
///
/// Pairs are combined as `blake3(left || right)` level by level; an odd
/// node at the end of a level is promoted unchanged. Returns `None` for an
/// empty history.
pub fn merkle_root(leaves: &[ContentHash]) -> Option<ContentHash> {
    if leaves.is_empty() {
        return None;
    }

    let mut level: Vec<ContentHash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                let mut hasher = blake3::Hasher::new();
                hasher.update(pair[0].as_bytes());
                hasher.update(pair[1].as_bytes());
                next.push(ContentHash::from_bytes(*hasher.finalize().as_bytes()));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }

    Some(level[0])
}
