//! The context artifact: one change set described for downstream consumers.

use chrono::{DateTime, Utc};
use ctxwatch_directory_watcher::{ChangeEvent, ChangeKind};
use ctxwatch_git::{DiffRecord, DiffStatus};
use serde::{Deserialize, Serialize};

use crate::config::OutputFormat;

/// The settled change that caused an artifact to be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub path: String,
    pub kind: ChangeKind,
}

impl From<&ChangeEvent> for Trigger {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            path: event.path.clone(),
            kind: event.kind,
        }
    }
}

/// A synthesized change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextArtifact {
    /// When the artifact was synthesized, at millisecond precision.
    pub timestamp: DateTime<Utc>,

    pub trigger: Trigger,

    /// Checked-out branch, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Files differing from the diff reference.
    #[serde(default)]
    pub changed_files: Vec<DiffRecord>,

    /// Files related to the trigger through the dependency map.
    #[serde(default)]
    pub related_files: Vec<String>,

    #[serde(default)]
    pub format: OutputFormat,
}

impl ContextArtifact {
    /// Combine a settled change, diff output and related paths.
    ///
    /// Duplicate changed paths keep their first record; duplicate related
    /// paths keep their first position.
    pub fn synthesize(
        change: &ChangeEvent,
        changed_files: Vec<DiffRecord>,
        related_files: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let timestamp = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        let mut seen = std::collections::HashSet::new();
        let changed_files = changed_files
            .into_iter()
            .filter(|record| seen.insert(record.path.clone()))
            .collect();

        let mut seen = std::collections::HashSet::new();
        let related_files = related_files
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .collect();

        Self {
            timestamp,
            trigger: Trigger::from(change),
            branch: None,
            changed_files,
            related_files,
            format: OutputFormat::default(),
        }
    }

    /// Set the branch.
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    /// Copy of this artifact tagged with another format.
    pub fn with_format(&self, format: OutputFormat) -> Self {
        Self {
            format,
            ..self.clone()
        }
    }

    /// Changed files per status.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in &self.changed_files {
            match record.status {
                DiffStatus::Added => counts.added += 1,
                DiffStatus::Modified => counts.modified += 1,
                DiffStatus::Deleted => counts.deleted += 1,
                DiffStatus::Unknown => counts.unknown += 1,
            }
        }
        counts
    }
}

/// Per-status tally of an artifact's changed files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted + self.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn change(path: &str) -> ChangeEvent {
        ChangeEvent::new(path, ChangeKind::Modified)
    }

    #[test]
    fn synthesize_deduplicates_inputs() {
        let artifact = ContextArtifact::synthesize(
            &change("a.ts"),
            vec![
                DiffRecord::new("a.ts", DiffStatus::Modified),
                DiffRecord::new("a.ts", DiffStatus::Deleted),
                DiffRecord::new("c.ts", DiffStatus::Added),
            ],
            vec!["b.ts".to_string(), "lib/*.ts".to_string(), "b.ts".to_string()],
        );

        assert_eq!(
            artifact.changed_files,
            vec![
                DiffRecord::new("a.ts", DiffStatus::Modified),
                DiffRecord::new("c.ts", DiffStatus::Added),
            ]
        );
        assert_eq!(artifact.related_files, vec!["b.ts", "lib/*.ts"]);
        assert_eq!(artifact.trigger.path, "a.ts");
        assert_eq!(artifact.timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn counts_tally_statuses() {
        let artifact = ContextArtifact::synthesize(
            &change("a.ts"),
            vec![
                DiffRecord::new("a.ts", DiffStatus::Modified),
                DiffRecord::new("b.ts", DiffStatus::Modified),
                DiffRecord::new("c.ts", DiffStatus::Deleted),
                DiffRecord::new("d.ts", DiffStatus::Unknown),
            ],
            Vec::new(),
        );

        let counts = artifact.counts();
        assert_eq!(counts.modified, 2);
        assert_eq!(counts.deleted, 1);
        assert_eq!(counts.added, 0);
        assert_eq!(counts.total(), 4);
    }
}
