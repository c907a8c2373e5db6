//! Branch records.

use serde::{Deserialize, Serialize};

use sealdrive_core::{Principal, VersionId};

/// The default branch every file starts on.
pub const MAIN_BRANCH: &str = "main";

/// A named line of development within one file's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name, unique within the file.
    pub name: String,

    /// The current head version.
    pub head: VersionId,

    /// Creation time (Unix milliseconds).
    pub created: i64,

    /// Who created the branch.
    pub created_by: Principal,

    /// The branch this one was forked from, if any. `main` has none.
    pub parent_branch: Option<String>,
}
