//! Watch targets: what the watcher subscribes to.
//!
//! A target is a path or glob relative to the project root. The OS watch is
//! registered on the target's static prefix (the directories before the first
//! wildcard) and raw events are then filtered by the target's pattern, since
//! the platform watchers cannot watch globs directly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use notify::RecursiveMode;
use tracing::warn;

use crate::error::Result;
use crate::pattern::{MatchStyle, Pattern, has_wildcards, normalize_str};

/// A single path or glob the watcher observes.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    /// The pattern as configured, normalized.
    pub pattern: String,

    /// Directory the OS watch is registered on.
    pub base: PathBuf,

    /// Whether the watch must be recursive.
    pub recursive: bool,

    /// Filter for raw events. `None` accepts everything under `base`.
    matcher: Option<Pattern>,
}

impl WatchTarget {
    /// Plan a target for `pattern` under `root`.
    pub fn new(root: &Path, pattern: &str) -> Result<Self> {
        let normalized = normalize_str(pattern);
        if normalized.is_empty() {
            return Ok(Self::everything(root));
        }

        if has_wildcards(&normalized) {
            let segments: Vec<&str> = normalized.split('/').collect();
            let first_glob = segments
                .iter()
                .position(|s| has_wildcards(s))
                .unwrap_or(segments.len());
            let prefix = segments[..first_glob].join("/");
            // Only a wildcard in the final segment (other than `**`) stays shallow.
            let recursive = first_glob + 1 < segments.len() || segments[first_glob] == "**";

            return Ok(Self {
                matcher: Some(Pattern::new(&normalized, MatchStyle::PathAware)?),
                base: root.join(prefix),
                recursive,
                pattern: normalized,
            });
        }

        let full = root.join(&normalized);
        if full.is_dir() {
            // A literal directory means everything beneath it.
            let subtree = format!("{normalized}/**");
            return Ok(Self {
                matcher: Some(Pattern::new(&subtree, MatchStyle::PathAware)?),
                base: full,
                recursive: true,
                pattern: normalized,
            });
        }

        let base = full.parent().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
        Ok(Self {
            matcher: Some(Pattern::new(&normalized, MatchStyle::PathAware)?),
            base,
            recursive: false,
            pattern: normalized,
        })
    }

    /// A recursive target covering the whole root.
    pub fn everything(root: &Path) -> Self {
        Self {
            pattern: "**".to_string(),
            base: root.to_path_buf(),
            recursive: true,
            matcher: None,
        }
    }

    /// Whether a normalized relative path belongs to this target.
    pub fn accepts(&self, path: &str) -> bool {
        self.matcher.as_ref().is_none_or(|m| m.matches(path))
    }
}

/// The full set of targets for one watch session.
///
/// Immutable once built; a configuration reload builds a new plan. The OS
/// registrations are resolved against the file system when the plan is built.
#[derive(Debug, Clone)]
pub struct WatchPlan {
    root: PathBuf,
    targets: Vec<WatchTarget>,
    registrations: Vec<(PathBuf, RecursiveMode)>,
}

impl WatchPlan {
    /// Watch the whole project root.
    pub fn all(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            targets: vec![WatchTarget::everything(&root)],
            registrations: vec![(root.clone(), RecursiveMode::Recursive)],
            root,
        }
    }

    /// Watch the given paths and globs. Invalid patterns are logged and skipped.
    pub fn from_patterns<'a>(
        root: impl Into<PathBuf>,
        patterns: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let root = root.into();
        let mut targets: Vec<WatchTarget> = Vec::new();

        for pattern in patterns {
            match WatchTarget::new(&root, pattern) {
                Ok(target) => {
                    if !targets.iter().any(|t| t.pattern == target.pattern) {
                        targets.push(target);
                    }
                }
                Err(e) => warn!("Skipping watch target: {e}"),
            }
        }

        let registrations = plan_registrations(&root, &targets);
        Self {
            root,
            targets,
            registrations,
        }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All targets.
    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Whether a normalized relative path falls under any target.
    pub fn accepts(&self, path: &str) -> bool {
        self.targets.iter().any(|t| t.accepts(path))
    }

    /// Directories to register with the OS watcher.
    ///
    /// No entry lies beneath a recursive one.
    pub fn registrations(&self) -> &[(PathBuf, RecursiveMode)] {
        &self.registrations
    }
}

/// Whether events in `dir` already arrive through `registrations`.
pub fn covered_by(dir: &Path, registrations: &[(PathBuf, RecursiveMode)]) -> bool {
    registrations.iter().any(|(base, mode)| match mode {
        RecursiveMode::Recursive => dir.starts_with(base),
        RecursiveMode::NonRecursive => dir == base,
    })
}

/// Resolve target bases into deduplicated registrations.
///
/// A base that does not exist yet is replaced by its nearest existing
/// ancestor, watched recursively so the target is seen once created.
/// Registering a directory again beneath a recursive watch would replace
/// that watch on inotify, so nested entries are dropped.
fn plan_registrations(root: &Path, targets: &[WatchTarget]) -> Vec<(PathBuf, RecursiveMode)> {
    let mut wanted: BTreeMap<PathBuf, bool> = BTreeMap::new();

    for target in targets {
        let (base, recursive) = if target.base.exists() {
            (target.base.clone(), target.recursive)
        } else {
            let ancestor = target
                .base
                .ancestors()
                .find(|p| p.exists())
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            (ancestor, true)
        };

        let entry = wanted.entry(base).or_insert(false);
        *entry |= recursive;
    }

    let recursive_bases: Vec<PathBuf> = wanted
        .iter()
        .filter(|(_, recursive)| **recursive)
        .map(|(path, _)| path.clone())
        .collect();

    wanted
        .into_iter()
        .filter(|(path, _)| {
            !recursive_bases
                .iter()
                .any(|base| base != path && path.starts_with(base))
        })
        .map(|(path, recursive)| {
            let mode = if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            (path, mode)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn glob_targets_watch_static_prefix() {
        let root = Path::new("/project");

        let deep = WatchTarget::new(root, "src/components/**/*.tsx").unwrap();
        assert_eq!(deep.base, Path::new("/project/src/components"));
        assert!(deep.recursive);
        assert!(deep.accepts("src/components/nav/menu.tsx"));
        assert!(!deep.accepts("src/app.tsx"));

        let shallow = WatchTarget::new(root, "src/*.ts").unwrap();
        assert_eq!(shallow.base, Path::new("/project/src"));
        assert!(!shallow.recursive);
    }

    #[test]
    fn literal_file_watches_parent() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("src")).unwrap();
        std::fs::write(temp_dir.path().join("src/app.tsx"), "").unwrap();

        let target = WatchTarget::new(temp_dir.path(), "./src/app.tsx").unwrap();
        assert_eq!(target.base, temp_dir.path().join("src"));
        assert!(!target.recursive);
        assert!(target.accepts("src/app.tsx"));
        assert!(!target.accepts("src/layout.tsx"));
    }

    #[test]
    fn literal_directory_covers_subtree() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("docs/guide")).unwrap();

        let target = WatchTarget::new(temp_dir.path(), "docs").unwrap();
        assert!(target.recursive);
        assert!(target.accepts("docs/guide/intro.md"));
        assert!(!target.accepts("src/main.rs"));
    }

    #[test]
    fn plan_deduplicates_and_accepts_union() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("src")).unwrap();

        let plan = WatchPlan::from_patterns(
            temp_dir.path(),
            ["src/a.ts", "src/b.ts", "src/a.ts", "bad[", "src/**/*.css"],
        );

        assert_eq!(plan.targets().len(), 3);
        assert!(plan.accepts("src/a.ts"));
        assert!(plan.accepts("src/theme/dark.css"));
        assert!(!plan.accepts("README.md"));

        let registrations = plan.registrations();
        assert_eq!(
            registrations,
            vec![(temp_dir.path().join("src"), RecursiveMode::Recursive)]
        );
    }

    #[test]
    fn missing_base_falls_back_to_existing_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let plan = WatchPlan::from_patterns(temp_dir.path(), ["not/yet/created.ts"]);

        assert_eq!(
            plan.registrations(),
            vec![(temp_dir.path().to_path_buf(), RecursiveMode::Recursive)]
        );
    }

    #[test]
    fn nested_targets_do_not_shadow_recursive_watch() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("src/x")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("lib")).unwrap();

        let plan = WatchPlan::from_patterns(
            temp_dir.path(),
            ["src/x/a.ts", "src/**", "src/x/deep/**/*.ts", "lib/*.rs"],
        );

        assert_eq!(
            plan.registrations(),
            vec![
                (temp_dir.path().join("lib"), RecursiveMode::NonRecursive),
                (temp_dir.path().join("src"), RecursiveMode::Recursive),
            ]
        );
        assert!(plan.accepts("src/x/a.ts"));
    }

    #[test]
    fn coverage_follows_watch_mode() {
        let registrations = vec![
            (PathBuf::from("/p"), RecursiveMode::NonRecursive),
            (PathBuf::from("/p/src"), RecursiveMode::Recursive),
        ];
        assert!(covered_by(Path::new("/p"), &registrations));
        assert!(covered_by(Path::new("/p/src/deep"), &registrations));
        assert!(!covered_by(Path::new("/p/.ctxwatch"), &registrations));
    }

    #[test]
    fn watch_all_accepts_everything() {
        let plan = WatchPlan::all("/project");
        assert!(plan.accepts("anything/at/all.txt"));
        assert_eq!(
            plan.registrations(),
            vec![(PathBuf::from("/project"), RecursiveMode::Recursive)]
        );
    }
}
