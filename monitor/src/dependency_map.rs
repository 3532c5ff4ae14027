//! Bidirectional dependency map over paths and globs.

use ctxwatch_directory_watcher::{MatchStyle, Pattern, Result, normalize_str};
use indexmap::IndexSet;
use tracing::{debug, warn};

/// One key and the targets it affects.
#[derive(Debug, Clone)]
struct DependencyEntry {
    key: Pattern,
    targets: Vec<Pattern>,
}

impl DependencyEntry {
    fn new(key: &str, targets: &[String]) -> Result<Self> {
        let key = Pattern::new(key, MatchStyle::PathAware)?;
        let mut compiled: Vec<Pattern> = Vec::with_capacity(targets.len());
        for target in targets {
            let target = Pattern::new(target, MatchStyle::PathAware)?;
            if !compiled.iter().any(|t| t.as_str() == target.as_str()) {
                compiled.push(target);
            }
        }

        Ok(Self {
            key,
            targets: compiled,
        })
    }
}

/// Read-only index answering "which files are related to this one".
///
/// Keys and targets are normalized to forward-slash relative form and may be
/// globs (`**` crosses directories, `*` and `?` do not). An entry with any
/// invalid pattern is logged and left out; the remaining entries still
/// resolve.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    entries: Vec<DependencyEntry>,
}

impl DependencyMap {
    /// Build a map from `(key, targets)` pairs, skipping invalid entries.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    {
        let mut map = Self::default();
        for (key, targets) in entries {
            if let Err(e) = map.insert(key, targets) {
                warn!("Skipping dependency entry '{key}': {e}");
            }
        }
        debug!("Dependency map holds {} entries", map.len());
        map
    }

    /// Add one entry.
    pub fn insert(&mut self, key: &str, targets: &[String]) -> Result<()> {
        self.entries.push(DependencyEntry::new(key, targets)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Targets of every key matching `path`.
    pub fn forward(&self, path: &str) -> Vec<String> {
        let path = normalize_str(path);
        let mut related = IndexSet::new();
        self.collect_forward(&path, &mut related);
        related.into_iter().collect()
    }

    /// Keys of every entry with a target matching `path`.
    pub fn reverse(&self, path: &str) -> Vec<String> {
        let path = normalize_str(path);
        let mut related = IndexSet::new();
        self.collect_reverse(&path, &mut related);
        related.into_iter().collect()
    }

    /// Union of [`forward`](Self::forward) and [`reverse`](Self::reverse)
    /// in order of first discovery. `path` itself is never included.
    pub fn related_to(&self, path: &str) -> Vec<String> {
        let path = normalize_str(path);
        let mut related = IndexSet::new();
        self.collect_forward(&path, &mut related);
        self.collect_reverse(&path, &mut related);
        related.into_iter().collect()
    }

    fn collect_forward(&self, path: &str, related: &mut IndexSet<String>) {
        for entry in self.entries.iter().filter(|e| e.key.matches(path)) {
            for target in &entry.targets {
                if target.as_str() != path {
                    related.insert(target.as_str().to_string());
                }
            }
        }
    }

    fn collect_reverse(&self, path: &str, related: &mut IndexSet<String>) {
        for entry in &self.entries {
            if entry.key.as_str() != path && entry.targets.iter().any(|t| t.matches(path)) {
                related.insert(entry.key.as_str().to_string());
            }
        }
    }
}
