//! Advisory integrity verification.
//!
//! Consulted whenever decrypted bytes cross the trust boundary back to a
//! caller. This check is advisory, not cryptographically binding: the
//! merkle-anchored version chain is the authoritative integrity mechanism,
//! and this report only tells the caller how much the retrieved bytes agree
//! with what the metadata claimed.

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Score below which the caller should ask the user to confirm.
pub const CONFIRMATION_THRESHOLD: u8 = 75;

/// What the caller expected the content to look like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedContent {
    /// Expected byte length, when known.
    pub size: Option<u64>,

    /// Expected content digest, when known.
    pub hash: Option<ContentHash>,
}

impl ExpectedContent {
    /// Expectation with only a size.
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            hash: None,
        }
    }

    /// Expectation with size and digest.
    pub fn new(size: u64, hash: ContentHash) -> Self {
        Self {
            size: Some(size),
            hash: Some(hash),
        }
    }
}

/// The result of an integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Digest of the bytes that were actually retrieved.
    pub hash: ContentHash,

    /// Whether the size matched expectations (None when size was unknown).
    pub size_match: Option<bool>,

    /// Risk score in [0, 100]; higher is better.
    pub score: u8,

    /// Human-readable warnings accumulated during the check.
    pub warnings: Vec<String>,
}

impl IntegrityReport {
    /// Whether the caller should ask the user before proceeding.
    pub fn requires_confirmation(&self) -> bool {
        self.score < CONFIRMATION_THRESHOLD
    }
}

/// Check retrieved bytes against expected metadata.
///
/// Scoring: starts at 50; +25 because the digest is always computable;
/// +25 when the byte length matches a known expected size (−25 and a
/// warning when it does not). A known-but-different expected digest adds a
/// warning without changing the score, since the digest comparison is what
/// the version chain already anchors.
pub fn verify_content(bytes: &[u8], expected: &ExpectedContent) -> IntegrityReport {
    let hash = ContentHash::hash(bytes);
    let mut score: i32 = 50 + 25;
    let mut warnings = Vec::new();

    let size_match = expected.size.map(|s| s == bytes.len() as u64);
    match size_match {
        Some(true) => score += 25,
        Some(false) => {
            score -= 25;
            warnings.push(format!(
                "size mismatch: expected {} bytes, got {}",
                expected.size.unwrap_or(0),
                bytes.len()
            ));
        }
        None => {}
    }

    if let Some(expected_hash) = expected.hash {
        if expected_hash != hash {
            warnings.push(format!(
                "content hash mismatch: expected {}, got {}",
                expected_hash, hash
            ));
        }
    }

    let score = score.clamp(0, 100) as u8;
    if score < CONFIRMATION_THRESHOLD {
        warnings.push("integrity score below threshold; confirm with the user".to_string());
    }

    IntegrityReport {
        hash,
        size_match,
        score,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match_scores_100() {
        let data = b"payload bytes";
        let expected = ExpectedContent::new(data.len() as u64, ContentHash::hash(data));
        let report = verify_content(data, &expected);

        assert_eq!(report.score, 100);
        assert_eq!(report.size_match, Some(true));
        assert!(report.warnings.is_empty());
        assert!(!report.requires_confirmation());
    }

    #[test]
    fn test_unknown_size_scores_75() {
        let report = verify_content(b"whatever", &ExpectedContent::default());
        assert_eq!(report.score, 75);
        assert_eq!(report.size_match, None);
        assert!(!report.requires_confirmation());
    }

    #[test]
    fn test_size_mismatch_warns_and_requires_confirmation() {
        let expected = ExpectedContent::with_size(999);
        let report = verify_content(b"short", &expected);

        assert_eq!(report.score, 50);
        assert_eq!(report.size_match, Some(false));
        assert!(report.requires_confirmation());
        assert!(report.warnings.iter().any(|w| w.contains("size mismatch")));
    }

    #[test]
    fn test_hash_mismatch_is_warning_not_failure() {
        let data = b"actual";
        let expected = ExpectedContent::new(data.len() as u64, ContentHash::hash(b"claimed"));
        let report = verify_content(data, &expected);

        // Size matched, so the score stays high; the hash disagreement is
        // surfaced as a warning for the caller's policy to escalate.
        assert_eq!(report.score, 100);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("content hash mismatch")));
    }
}
