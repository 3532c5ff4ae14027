//! The per-change pipeline: related files, diff, synthesis, publish.

use std::sync::Arc;

use ctxwatch_context_files::{ContextArtifact, PublishReport};
use ctxwatch_directory_watcher::ChangeEvent;
use tracing::{debug, info};

use crate::snapshot::Snapshot;

/// What one pipeline run did.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// The settled change that started the run.
    pub trigger: ChangeEvent,

    /// Files related to the trigger through the dependency map.
    pub related_files: Vec<String>,

    /// Number of records returned by the diff oracle.
    pub diff_count: usize,

    /// Per-target publish outcomes.
    pub publish: PublishReport,
}

/// Run the full pipeline for one settled change against one snapshot.
///
/// Never fails: an unavailable diff becomes an empty list and a failing
/// target is recorded in the report.
pub async fn run(snapshot: Arc<Snapshot>, change: ChangeEvent) -> PipelineReport {
    info!("File {}: {}", change.kind, change.path);

    let related_files = snapshot.dependencies.related_to(&change.path);
    if related_files.is_empty() {
        debug!("No related files found for {}", change.path);
    } else {
        info!("Related files that may need attention:");
        for path in &related_files {
            info!("  → {path}");
        }
    }

    let git = &snapshot.config.git_config;
    let (changed_files, branch) = if git.enabled {
        let repo = snapshot.repository();
        let changes = snapshot.oracle.changes_or_empty(&repo, &git.branch).await;
        let branch = snapshot.oracle.current_branch(&repo).await;
        (changes, branch)
    } else {
        (Vec::new(), None)
    };
    let diff_count = changed_files.len();

    let artifact = ContextArtifact::synthesize(&change, changed_files, related_files.clone())
        .with_branch(branch);
    let publish = snapshot.publisher.publish(&artifact).await;

    PipelineReport {
        trigger: change,
        related_files,
        diff_count,
        publish,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use async_trait::async_trait;
    use ctxwatch_context_files::{OutputConfig, OutputFormat, TargetConfig, parse};
    use ctxwatch_directory_watcher::ChangeKind;
    use ctxwatch_git::{DiffOracle, DiffRecord, DiffStatus, GitError};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedOracle(Vec<DiffRecord>);

    #[async_trait]
    impl DiffOracle for FixedOracle {
        async fn get_changes(
            &self,
            _repo: &Path,
            _reference: &str,
        ) -> ctxwatch_git::Result<Vec<DiffRecord>> {
            Ok(self.0.clone())
        }

        async fn current_branch(&self, _repo: &Path) -> Option<String> {
            Some("main".to_string())
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl DiffOracle for FailingOracle {
        async fn get_changes(
            &self,
            repo: &Path,
            _reference: &str,
        ) -> ctxwatch_git::Result<Vec<DiffRecord>> {
            Err(GitError::NotARepository(repo.to_path_buf()))
        }
    }

    fn config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config
            .relational_map
            .insert("a.ts".to_string(), vec!["b.ts".to_string()]);
        config.output_config = OutputConfig::empty()
            .with_target("md", TargetConfig::new("out/context.md", OutputFormat::Markdown));
        config.output_config.keep_history = false;
        config
    }

    async fn snapshot(root: &Path, oracle: Arc<dyn DiffOracle>) -> Arc<Snapshot> {
        let config_path = MonitorConfig::default_path(root);
        Arc::new(Snapshot::build(root, &config_path, config(), Some(oracle)).await)
    }

    #[tokio::test]
    async fn publishes_related_files_and_diff() {
        let temp_dir = TempDir::new().unwrap();
        let oracle = Arc::new(FixedOracle(vec![DiffRecord::new("a.ts", DiffStatus::Modified)]));
        let snapshot = snapshot(temp_dir.path(), oracle).await;

        let report = run(snapshot, ChangeEvent::new("a.ts", ChangeKind::Modified)).await;

        assert_eq!(report.related_files, vec!["b.ts"]);
        assert_eq!(report.diff_count, 1);
        assert!(report.publish.is_complete());

        let content = std::fs::read_to_string(temp_dir.path().join("out/context.md")).unwrap();
        let artifact = parse(OutputFormat::Markdown, &content).unwrap();
        assert_eq!(artifact.related_files, vec!["b.ts"]);
        assert_eq!(artifact.branch.as_deref(), Some("main"));
        assert_eq!(
            artifact.changed_files,
            vec![DiffRecord::new("a.ts", DiffStatus::Modified)]
        );
    }

    #[tokio::test]
    async fn unavailable_diff_still_publishes() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = snapshot(temp_dir.path(), Arc::new(FailingOracle)).await;

        let report = run(snapshot, ChangeEvent::new("b.ts", ChangeKind::Removed)).await;

        assert_eq!(report.related_files, vec!["a.ts"]);
        assert_eq!(report.diff_count, 0);
        assert!(report.publish.is_complete());
        assert!(temp_dir.path().join("out/context.md").exists());
    }
}
