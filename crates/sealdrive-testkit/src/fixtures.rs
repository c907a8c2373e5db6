//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use sealdrive::{Drive, FileId, Principal, Version, MAIN_BRANCH};
use sealdrive_store::MemoryStore;

/// The standard cast of test principals.
pub fn alice() -> Principal {
    Principal::new("alice")
}

pub fn bob() -> Principal {
    Principal::new("bob")
}

pub fn carol() -> Principal {
    Principal::new("carol")
}

/// Sample metadata used across tests.
pub fn sample_metadata() -> BTreeMap<String, String> {
    [
        ("content-type".to_string(), "text/plain".to_string()),
        ("label".to_string(), "fixture".to_string()),
    ]
    .into_iter()
    .collect()
}

/// A drive over a fresh memory store with a ready-made owner.
pub struct DriveFixture {
    pub drive: Drive<Arc<MemoryStore>>,
    pub owner: Principal,
}

impl DriveFixture {
    /// Create an empty fixture.
    pub fn new() -> Self {
        Self {
            drive: Drive::open(Arc::new(MemoryStore::new())).expect("open drive"),
            owner: alice(),
        }
    }

    /// Create a file owned by the fixture owner and return its version 1.
    pub fn seed_file(&self, file_id: &str, content: &[u8]) -> Version {
        self.drive
            .create_file(
                &FileId::new(file_id),
                content,
                sample_metadata(),
                &self.owner,
            )
            .expect("seed file")
    }

    /// Seed a file with `count` linear versions on `main`.
    ///
    /// Bodies grow by distinct amounts so the history mixes change types.
    pub fn seed_history(&self, file_id: &str, count: usize) -> Vec<Version> {
        let file = FileId::new(file_id);
        let mut versions = vec![self.seed_file(file_id, b"version 1")];

        for i in 2..=count {
            let body = format!("version {} {}", i, "x".repeat(i * 7));
            let version = self
                .drive
                .update_file(
                    &file,
                    body.as_bytes(),
                    sample_metadata(),
                    &self.owner,
                    "seeded edit",
                    None,
                )
                .expect("seed version");
            versions.push(version);
        }
        versions
    }

    /// Seed a file with diverging `main` and `draft` branches.
    ///
    /// Returns (main head, draft head); merging them conflicts on content.
    pub fn seed_diverged(&self, file_id: &str) -> (Version, Version) {
        let file = FileId::new(file_id);
        self.seed_file(file_id, b"common base");
        self.drive
            .create_branch(&file, MAIN_BRANCH, "draft", &self.owner)
            .expect("create branch");

        let main_head = self
            .drive
            .update_file(
                &file,
                b"main line of development",
                sample_metadata(),
                &self.owner,
                "main edit",
                None,
            )
            .expect("main edit");
        let draft_head = self
            .drive
            .update_file(
                &file,
                b"draft line of development",
                sample_metadata(),
                &self.owner,
                "draft edit",
                Some("draft"),
            )
            .expect("draft edit");

        (main_head, draft_head)
    }
}

impl Default for DriveFixture {
    fn default() -> Self {
        Self::new()
    }
}
