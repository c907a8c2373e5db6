//! # Sealdrive Testkit
//!
//! Testing utilities shared across the Sealdrive crates.
//!
//! ## Fixtures
//!
//! Quickly set up drive scenarios:
//!
//! ```rust
//! use sealdrive_testkit::fixtures::DriveFixture;
//!
//! let fixture = DriveFixture::new();
//! let versions = fixture.seed_history("notes.txt", 3);
//! assert_eq!(versions.len(), 3);
//! ```
//!
//! ## Property testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealdrive_testkit::generators::{content, principal};
//!
//! proptest! {
//!     #[test]
//!     fn hashes_are_stable(bytes in content(256)) {
//!         let a = sealdrive::ContentHash::hash(&bytes);
//!         let b = sealdrive::ContentHash::hash(&bytes);
//!         prop_assert_eq!(a, b);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{alice, bob, carol, sample_metadata, DriveFixture};
