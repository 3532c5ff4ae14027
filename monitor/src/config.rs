//! Monitor configuration: loading, defaults and first-run bootstrap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ctxwatch_context_files::OutputConfig;
use ctxwatch_git::GitConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info, warn};

use crate::error::{MonitorError, Result};

/// Directory holding the configuration file, relative to the project root.
pub const CONFIG_DIR: &str = ".ctxwatch";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Document written when no configuration exists yet.
pub const DEFAULT_CONFIG: &str = r##"# ctxwatch configuration

# Watch the whole project. Set to false to watch only `watchDirectories`
# and the files named in `relationalMap`.
watchAllFiles = true

# Milliseconds a file must stay quiet before its change is processed.
debounceTime = 100

# Patterns to ignore, in addition to the ignore file.
ignoredPatterns = ["node_modules/**", "dist/**", ".git/**", "**/*.log"]

# Extra watch targets when watchAllFiles is false.
watchDirectories = []

# Ignore file read at startup and on every reload.
ignoreFile = ".gitignore"

# Seconds between idle status reports.
idleReportSecs = 300

# Files related to each other. Keys and targets may be globs:
# `**` crosses directories, `*` and `?` stay within one.
[relationalMap]
# "src/components/sidebar.tsx" = ["src/layout.tsx", "src/app.tsx", "tailwind.config.js"]
# "tailwind.config.js" = ["src/components/**/*.tsx"]

[gitConfig]
enabled = true
repositoryPath = "."
branch = "HEAD"
# Use `git status --porcelain` instead of `git diff --name-only <branch>`.
showGitStatus = false
timeoutMs = 10000

[outputConfig]
enabled = true
keepHistory = true
historyPath = "AI_Context/history"
maxHistoryFiles = 10
createMissingDirectories = true

[outputConfig.targets.claude]
enabled = true
outputPath = "AI_Context/claude/context.md"
format = "markdown"
headerTemplate = "# Project Update Context"
# templatePath = "AI_Context/templates/claude.md"

[outputConfig.targets.chatgpt]
enabled = true
outputPath = "AI_Context/chatgpt/context.json"
format = "json"
headerTemplate = ""
"##;

/// Everything the monitor reads from its configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Watch the whole project instead of the relational-map targets.
    pub watch_all_files: bool,

    /// Per-path quiet window, in milliseconds.
    pub debounce_time: u64,

    /// Ignore patterns in addition to the ignore file.
    pub ignored_patterns: Vec<String>,

    /// Extra watch targets in relational-map mode.
    pub watch_directories: Vec<String>,

    /// Dependency map source, in document order.
    pub relational_map: IndexMap<String, Vec<String>>,

    /// Ignore file, relative to the project root.
    pub ignore_file: PathBuf,

    /// Interval of the idle status report, in seconds.
    pub idle_report_secs: u64,

    pub git_config: GitConfig,

    pub output_config: OutputConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_all_files: true,
            debounce_time: 100,
            ignored_patterns: ["node_modules/**", "dist/**", ".git/**", "**/*.log"]
                .into_iter()
                .map(String::from)
                .collect(),
            watch_directories: Vec::new(),
            relational_map: IndexMap::new(),
            ignore_file: PathBuf::from(".gitignore"),
            idle_report_secs: 300,
            git_config: GitConfig::default(),
            output_config: OutputConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Default configuration file location for a project root.
    pub fn default_path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Parse a configuration document.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| MonitorError::ConfigMalformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read and parse the configuration file.
    pub async fn read(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path)
                .await
                .map_err(|source| MonitorError::ConfigUnavailable {
                    path: path.to_path_buf(),
                    source,
                })?;
        Self::parse(&content, path)
    }

    /// Read the configuration file, falling back to defaults on any error.
    pub async fn load(path: &Path) -> Self {
        match Self::read(path).await {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e @ MonitorError::ConfigMalformed { .. }) => {
                error!("{e}; using built-in defaults");
                Self::default()
            }
            Err(e) => {
                warn!("{e}; using built-in defaults");
                Self::default()
            }
        }
    }

    /// Write the default document if no configuration exists.
    ///
    /// Returns whether a file was written. This is the only fatal step of
    /// configuration handling.
    pub async fn bootstrap(path: &Path) -> Result<bool> {
        if fs::try_exists(path).await.unwrap_or(false) {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| MonitorError::Bootstrap {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        fs::write(path, DEFAULT_CONFIG)
            .await
            .map_err(|source| MonitorError::Bootstrap {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Created default configuration at {}", path.display());
        Ok(true)
    }

    /// Per-path quiet window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_time)
    }

    /// Interval of the idle status report, never shorter than a second.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_report_secs.max(1))
    }

    /// Watch targets for relational-map mode: `watchDirectories`, then every
    /// key and target of the relational map, without repeats.
    pub fn watch_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        let all = self.watch_directories.iter().chain(
            self.relational_map
                .iter()
                .flat_map(|(key, targets)| std::iter::once(key).chain(targets)),
        );
        for pattern in all {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn default_document_matches_defaults() {
        let parsed = MonitorConfig::parse(DEFAULT_CONFIG, Path::new("config.toml")).unwrap();
        assert_eq!(parsed, MonitorConfig::default());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = MonitorConfig::parse(
            r#"
            debounceTime = 50
            [relationalMap]
            "a.ts" = ["b.ts"]
            "#,
            Path::new("config.toml"),
        )
        .unwrap();

        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert!(config.watch_all_files);
        assert_eq!(config.relational_map["a.ts"], vec!["b.ts"]);
        assert_eq!(config.git_config, GitConfig::default());
        assert_eq!(config.output_config, OutputConfig::default());
    }

    #[test]
    fn relational_map_keeps_document_order() {
        let config = MonitorConfig::parse(
            r#"
            [relationalMap]
            "z.ts" = ["y.ts"]
            "a.ts" = ["b.ts", "y.ts"]
            "#,
            Path::new("config.toml"),
        )
        .unwrap();

        let keys: Vec<_> = config.relational_map.keys().collect();
        assert_eq!(keys, vec!["z.ts", "a.ts"]);
        assert_eq!(config.watch_patterns(), vec!["z.ts", "y.ts", "a.ts", "b.ts"]);
    }

    #[tokio::test]
    async fn malformed_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "debounceTime = \"soon\"\n[[[").unwrap();

        let err = MonitorConfig::read(&path).await.unwrap_err();
        assert!(matches!(err, MonitorError::ConfigMalformed { .. }));
        assert_eq!(MonitorConfig::load(&path).await, MonitorConfig::default());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");

        let err = MonitorConfig::read(&path).await.unwrap_err();
        assert!(matches!(err, MonitorError::ConfigUnavailable { .. }));
        assert_eq!(MonitorConfig::load(&path).await, MonitorConfig::default());
    }

    #[tokio::test]
    async fn bootstrap_writes_default_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = MonitorConfig::default_path(temp_dir.path());

        assert!(MonitorConfig::bootstrap(&path).await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);

        std::fs::write(&path, "debounceTime = 5\n").unwrap();
        assert!(!MonitorConfig::bootstrap(&path).await.unwrap());
        assert_eq!(MonitorConfig::load(&path).await.debounce_time, 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bootstrap_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // A file where the config directory should be.
        std::fs::write(temp_dir.path().join(CONFIG_DIR), "").unwrap();

        let err = MonitorConfig::bootstrap(&MonitorConfig::default_path(temp_dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Bootstrap { .. }));
    }
}
