//! Ignore policy: one predicate over normalized relative paths.
//!
//! Rules come from three places and form a plain union, any match ignores:
//! built-in defaults, an ignore file (usually `.gitignore`) and explicitly
//! configured patterns. All rules use [`MatchStyle::Loose`] semantics, see
//! [`crate::pattern`] for how that differs from gitignore.

use std::path::Path;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, WatcherError};
use crate::pattern::{MatchStyle, Pattern};

/// Built-in rules: dot files (including VCS metadata), dependency caches,
/// build output, logs and scratch files.
const DEFAULT_PATTERNS: &[&str] = &[
    ".*",
    "*/.*",
    ".git",
    ".git/*",
    "*/.git/*",
    "node_modules",
    "node_modules/*",
    "*/node_modules/*",
    "target/*",
    "dist/*",
    "build/*",
    "__pycache__/*",
    "*/__pycache__/*",
    "*.log",
    "*.db",
    "*.tmp",
    "*.swp",
    "*~",
];

/// Where an ignore rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    /// Built into the watcher.
    Default,

    /// Read from the ignore file.
    IgnoreFile,

    /// Listed in configuration.
    Config,

    /// Added by the monitor for its own files.
    Internal,
}

/// A single compiled ignore rule.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pub pattern: Pattern,
    pub source: RuleSource,
}

/// Combined ignore predicate.
#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    rules: Vec<IgnoreRule>,
}

impl IgnorePolicy {
    /// A policy that ignores nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A policy holding only the built-in rules.
    pub fn with_defaults() -> Self {
        let mut policy = Self::empty();
        policy.add_patterns(DEFAULT_PATTERNS.iter().copied(), RuleSource::Default);
        policy
    }

    /// Add one pattern.
    pub fn add_pattern(&mut self, pattern: &str, source: RuleSource) -> Result<()> {
        let pattern = Pattern::new(pattern, MatchStyle::Loose)?;
        self.rules.push(IgnoreRule { pattern, source });
        Ok(())
    }

    /// Add many patterns. Invalid ones are logged and skipped.
    pub fn add_patterns<'a>(
        &mut self,
        patterns: impl IntoIterator<Item = &'a str>,
        source: RuleSource,
    ) -> usize {
        let mut added = 0;
        for pattern in patterns {
            match self.add_pattern(pattern, source) {
                Ok(()) => added += 1,
                Err(e) => warn!("Skipping ignore rule: {e}"),
            }
        }
        added
    }

    /// Read an ignore file and add its rules.
    ///
    /// Blank lines and `#` comments are skipped. Returns the number of rules
    /// added.
    pub async fn load_ignore_file(&mut self, path: &Path) -> Result<usize> {
        let content =
            fs::read_to_string(path)
                .await
                .map_err(|source| WatcherError::IgnoreSourceUnavailable {
                    path: path.to_path_buf(),
                    source,
                })?;

        let lines = parse_ignore_lines(&content);
        let added = self.add_patterns(lines.iter().map(String::as_str), RuleSource::IgnoreFile);
        info!("Loaded {added} ignore rules from {}", path.display());
        Ok(added)
    }

    /// Whether a normalized relative path should be ignored.
    pub fn should_ignore(&self, path: &str) -> bool {
        let hit = self.rules.iter().find(|rule| rule.pattern.matches(path));
        if let Some(rule) = hit {
            debug!("Ignoring {path} (rule `{}`)", rule.pattern.as_str());
        }
        hit.is_some()
    }

    /// All rules in insertion order.
    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the policy has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Extract patterns from ignore-file content.
pub fn parse_ignore_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
