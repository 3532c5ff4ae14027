//! Immutable configuration snapshots.
//!
//! Everything derived from one configuration document (dependency map,
//! ignore policy, watch plan, publisher, diff oracle) is built together and
//! shared behind an `Arc`. A reload builds a new snapshot and swaps it in;
//! pipelines already running keep the snapshot they started with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ctxwatch_context_files::ContextPublisher;
use ctxwatch_directory_watcher::{
    IgnorePolicy, RuleSource, WatchPlan, WatcherError, normalize_path,
};
use ctxwatch_git::{DiffOracle, GitDiffOracle};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::dependency_map::DependencyMap;

/// Quiet window for configuration and ignore-file reloads.
pub const RELOAD_QUIET: Duration = Duration::from_millis(50);

/// One consistent view of the configuration.
pub struct Snapshot {
    pub root: PathBuf,
    pub config: MonitorConfig,
    pub dependencies: DependencyMap,
    pub ignore: Arc<IgnorePolicy>,
    pub plan: WatchPlan,
    pub publisher: ContextPublisher,
    pub oracle: Arc<dyn DiffOracle>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("dependencies", &self.dependencies.len())
            .field("ignore_rules", &self.ignore.len())
            .field("watch_targets", &self.plan.targets().len())
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    /// Build a snapshot from a loaded configuration.
    ///
    /// `oracle` replaces the git-backed diff oracle when given.
    pub async fn build(
        root: &Path,
        config_path: &Path,
        config: MonitorConfig,
        oracle: Option<Arc<dyn DiffOracle>>,
    ) -> Self {
        let dependencies = DependencyMap::from_entries(&config.relational_map);
        let publisher = ContextPublisher::new(root, config.output_config.clone());
        let ignore = build_ignore_policy(root, config_path, &config, &publisher).await;

        let plan = if config.watch_all_files {
            info!("Monitoring all files in {}", root.display());
            WatchPlan::all(root)
        } else {
            let plan = build_relational_plan(root, config.watch_patterns()).await;
            if plan.targets().is_empty() {
                warn!("Relational-map mode with nothing to watch");
            } else {
                info!(
                    "Monitoring {} targets from the relational map",
                    plan.targets().len()
                );
            }
            plan
        };

        let oracle = oracle.unwrap_or_else(|| {
            Arc::new(GitDiffOracle::from_config(&config.git_config)) as Arc<dyn DiffOracle>
        });

        Self {
            root: root.to_path_buf(),
            config,
            dependencies,
            ignore: Arc::new(ignore),
            plan,
            publisher,
            oracle,
        }
    }

    /// Absolute path of the ignore file.
    pub fn ignore_file(&self) -> PathBuf {
        self.root.join(&self.config.ignore_file)
    }

    /// Repository the diff oracle runs in.
    pub fn repository(&self) -> PathBuf {
        self.root.join(&self.config.git_config.repository_path)
    }
}

/// Resolve watch registrations off the runtime; they check the file system.
async fn build_relational_plan(root: &Path, patterns: Vec<String>) -> WatchPlan {
    let owned_root = root.to_path_buf();
    let built = tokio::task::spawn_blocking(move || {
        WatchPlan::from_patterns(owned_root, patterns.iter().map(String::as_str))
    })
    .await;
    match built {
        Ok(plan) => plan,
        Err(e) => {
            error!("Building the watch plan failed: {e}");
            WatchPlan::from_patterns(root, std::iter::empty::<&str>())
        }
    }
}

/// Defaults, ignore file, configured patterns, then the monitor's own files.
async fn build_ignore_policy(
    root: &Path,
    config_path: &Path,
    config: &MonitorConfig,
    publisher: &ContextPublisher,
) -> IgnorePolicy {
    let mut policy = IgnorePolicy::with_defaults();

    let ignore_file = root.join(&config.ignore_file);
    match policy.load_ignore_file(&ignore_file).await {
        Ok(_) => {}
        Err(WatcherError::IgnoreSourceUnavailable { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!("No ignore file at {}", ignore_file.display());
        }
        Err(e) => warn!("{e}; continuing with configured patterns only"),
    }

    policy.add_patterns(
        config.ignored_patterns.iter().map(String::as_str),
        RuleSource::Config,
    );

    let own_files = [config_path, ignore_file.as_path()]
        .into_iter()
        .filter_map(|path| normalize_path(root, path))
        .filter(|path| !path.is_empty())
        .chain(publisher.self_exclusions());
    for pattern in own_files {
        if let Err(e) = policy.add_pattern(&pattern, RuleSource::Internal) {
            warn!("Cannot exclude {pattern}: {e}");
        }
    }

    debug!("Ignore policy holds {} rules", policy.len());
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn snapshot(root: &Path, config: MonitorConfig) -> Snapshot {
        let config_path = MonitorConfig::default_path(root);
        Snapshot::build(root, &config_path, config, None).await
    }

    #[tokio::test]
    async fn ignore_policy_combines_all_sources() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".gitignore"), "# comment\n\nsecrets/*\n").unwrap();
        let mut config = MonitorConfig::default();
        config.ignored_patterns = vec!["*.bak".to_string()];

        let snapshot = snapshot(temp_dir.path(), config).await;
        let ignore = &snapshot.ignore;

        assert!(ignore.should_ignore("secrets/key.pem"));
        assert!(ignore.should_ignore("src/old.bak"));
        assert!(ignore.should_ignore("node_modules/x/index.js"));
        assert!(ignore.should_ignore(".ctxwatch/config.toml"));
        assert!(ignore.should_ignore("AI_Context/claude/context.md"));
        assert!(ignore.should_ignore("AI_Context/history/claude_2024-01-01T00-00-00-000Z.md"));
        assert!(!ignore.should_ignore("src/app.ts"));

        let sources: Vec<RuleSource> = ignore.rules().iter().map(|r| r.source).collect();
        assert!(sources.contains(&RuleSource::IgnoreFile));
        assert!(sources.contains(&RuleSource::Internal));
    }

    #[tokio::test]
    async fn missing_ignore_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = snapshot(temp_dir.path(), MonitorConfig::default()).await;
        assert!(!snapshot.ignore.should_ignore("src/app.ts"));
        assert!(snapshot.ignore.should_ignore("debug.log"));
    }

    #[tokio::test]
    async fn relational_mode_watches_map_entries() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = MonitorConfig::default();
        config.watch_all_files = false;
        config
            .relational_map
            .insert("src/a.ts".to_string(), vec!["lib/**/*.ts".to_string()]);

        let snapshot = snapshot(temp_dir.path(), config).await;

        assert_eq!(snapshot.plan.targets().len(), 2);
        assert!(snapshot.plan.accepts("src/a.ts"));
        assert!(snapshot.plan.accepts("lib/x/y.ts"));
        assert!(!snapshot.plan.accepts("src/b.ts"));
        assert_eq!(snapshot.dependencies.related_to("lib/x/y.ts"), vec!["src/a.ts"]);
    }

    #[tokio::test]
    async fn watch_all_accepts_everything() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = snapshot(temp_dir.path(), MonitorConfig::default()).await;
        assert!(snapshot.plan.accepts("any/where/file.rs"));
        assert_eq!(snapshot.repository(), temp_dir.path().join("."));
    }
}
