//! Configuration for the diff adapter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `gitConfig` section of the monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitConfig {
    /// Whether to consult git at all.
    pub enabled: bool,

    /// Repository path, relative to the project root.
    pub repository_path: PathBuf,

    /// Reference to diff against.
    pub branch: String,

    /// Use `git status --porcelain` instead of a name-only diff.
    pub show_git_status: bool,

    /// Upper bound on a single git invocation, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository_path: PathBuf::from("."),
            branch: "HEAD".to_string(),
            show_git_status: false,
            timeout_ms: 10_000,
        }
    }
}
