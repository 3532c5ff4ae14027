//! Diff records and parsing of git output.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Status of a path relative to the diff reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Modified,
    Deleted,
    Unknown,
}

impl DiffStatus {
    /// Map a porcelain status letter.
    pub fn from_letter(letter: char) -> Self {
        match letter {
            'M' => Self::Modified,
            'A' => Self::Added,
            'D' => Self::Deleted,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed path reported by the diff oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffRecord {
    pub path: String,
    pub status: DiffStatus,
}

impl DiffRecord {
    pub fn new(path: impl Into<String>, status: DiffStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// Parse `git diff --name-only` output.
///
/// Name-only output carries no status, so it is inferred from the working
/// tree: a listed path that no longer exists is `deleted`, anything else is
/// `modified`.
pub async fn parse_name_only(output: &str, repo: &Path) -> Vec<DiffRecord> {
    let mut records = Vec::new();
    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let path = unquote(line);
        let status = if tokio::fs::try_exists(repo.join(path)).await.unwrap_or(false) {
            DiffStatus::Modified
        } else {
            DiffStatus::Deleted
        };
        records.push(DiffRecord::new(path, status));
    }
    records
}

/// Parse `git status --porcelain` (v1) output.
///
/// The index column wins over the work-tree column when both carry a letter.
/// Renames and copies report the destination path.
pub fn parse_porcelain(output: &str) -> Vec<DiffRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut chars = line.chars();
            let index = chars.next()?;
            let worktree = chars.next()?;
            let rest = line.get(3..)?.trim();
            if rest.is_empty() {
                return None;
            }

            let letter = if index != ' ' && index != '?' {
                index
            } else {
                worktree
            };
            let path = rest.rsplit(" -> ").next().unwrap_or(rest);
            Some(DiffRecord::new(unquote(path), DiffStatus::from_letter(letter)))
        })
        .collect()
}

fn unquote(path: &str) -> &str {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
}
