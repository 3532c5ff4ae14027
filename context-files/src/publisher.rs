//! Publishing artifacts to their output targets.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ctxwatch_directory_watcher::{normalize_path, normalize_str};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::artifact::ContextArtifact;
use crate::config::{OutputConfig, OutputFormat, TargetConfig};
use crate::error::{ContextError, Result, StorageError};
use crate::history::HistoryStore;
use crate::render::{render, render_template};

/// Distinguishes temp files of concurrent writers within this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One target written successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedTarget {
    pub target: String,
    pub output: PathBuf,
    /// History entry, when history is kept and archiving succeeded.
    pub history: Option<PathBuf>,
}

/// One target that could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub message: String,
}

/// Outcome of publishing one artifact to every enabled target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: Vec<PublishedTarget>,
    pub failures: Vec<TargetFailure>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes artifacts to the configured targets of one project.
#[derive(Debug)]
pub struct ContextPublisher {
    root: PathBuf,
    config: OutputConfig,
    history: Option<HistoryStore>,
}

impl ContextPublisher {
    /// Create a publisher resolving relative paths against `root`.
    pub fn new(root: impl Into<PathBuf>, config: OutputConfig) -> Self {
        let root = root.into();
        // A zero bound would delete every entry right after writing it.
        let history = (config.keep_history && config.max_history_files > 0)
            .then(|| HistoryStore::new(root.join(&config.history_path), config.max_history_files));

        Self {
            root,
            config,
            history,
        }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&HistoryStore> {
        self.history.as_ref()
    }

    /// Absolute output path of `target`.
    pub fn output_path(&self, target: &TargetConfig) -> PathBuf {
        self.root.join(&target.output_path)
    }

    /// Ignore patterns covering everything this publisher writes.
    pub fn self_exclusions(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        for (_, target) in self.config.enabled_targets() {
            if let Some(output) = self.relative(&target.output_path) {
                patterns.push(format!("{output}.*.tmp"));
                patterns.push(output);
            }
        }
        if self.history.is_some() {
            if let Some(history) = self.relative(&self.config.history_path) {
                patterns.push(format!("{history}/*"));
                patterns.push(history);
            }
        }
        patterns
    }

    /// Create the output and history directories when configured to.
    ///
    /// Every directory is attempted; the first failure is returned.
    pub async fn ensure_directories(&self) -> Result<()> {
        if !self.config.enabled || !self.config.create_missing_directories {
            return Ok(());
        }

        let mut dirs: Vec<PathBuf> = self
            .config
            .enabled_targets()
            .filter_map(|(_, target)| self.output_path(target).parent().map(Path::to_path_buf))
            .collect();
        if let Some(history) = &self.history {
            dirs.push(history.dir().to_path_buf());
        }
        dirs.sort();
        dirs.dedup();

        let mut first_error = None;
        for dir in dirs {
            if let Err(e) = fs::create_dir_all(&dir).await {
                warn!("Failed to create directory {}: {e}", dir.display());
                first_error.get_or_insert_with(|| {
                    StorageError::CreateDirectory(format!("{}: {e}", dir.display()))
                });
            } else {
                debug!("Ensured directory {}", dir.display());
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Publish `artifact` to every enabled target.
    ///
    /// A failing target is logged and recorded; the others are still written.
    pub async fn publish(&self, artifact: &ContextArtifact) -> PublishReport {
        let mut report = PublishReport::default();
        if !self.config.enabled {
            debug!("Output disabled, not publishing");
            return report;
        }

        for (name, target) in self.config.enabled_targets() {
            match self.publish_target(name, target, artifact).await {
                Ok(published) => report.published.push(published),
                Err(e) => {
                    warn!("{e}");
                    report.failures.push(TargetFailure {
                        target: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Publish `artifact` to a single target.
    pub async fn publish_target(
        &self,
        name: &str,
        target: &TargetConfig,
        artifact: &ContextArtifact,
    ) -> Result<PublishedTarget> {
        let content = self
            .render_for(name, target, artifact)
            .await
            .map_err(|e| ContextError::publish(name, e))?;

        let output = self.output_path(target);
        self.write_output(&output, &content)
            .await
            .map_err(|e| ContextError::publish(name, e))?;
        info!("Context written for {name}: {}", output.display());

        let history = match &self.history {
            Some(store) => match store.archive(name, target.format.extension(), &content).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to save context history for {name}: {e}");
                    None
                }
            },
            None => None,
        };

        Ok(PublishedTarget {
            target: name.to_string(),
            output,
            history,
        })
    }

    async fn render_for(
        &self,
        name: &str,
        target: &TargetConfig,
        artifact: &ContextArtifact,
    ) -> Result<String> {
        match (&target.template_path, target.format) {
            (Some(template), OutputFormat::Json) => {
                debug!(
                    "Target {name} is json; ignoring template {}",
                    template.display()
                );
                render(artifact, target)
            }
            (Some(template), _) => {
                let path = self.root.join(template);
                let template = fs::read_to_string(&path)
                    .await
                    .map_err(|source| ContextError::Template {
                        path: path.clone(),
                        source,
                    })?;
                Ok(render_template(
                    &template,
                    &artifact.with_format(target.format),
                    target,
                ))
            }
            (None, _) => render(artifact, target),
        }
    }

    /// Replace `path` with `content` through a temp file and rename.
    async fn write_output(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !fs::try_exists(parent).await.unwrap_or(false) {
                if !self.config.create_missing_directories {
                    return Err(
                        StorageError::MissingDirectory(parent.display().to_string()).into(),
                    );
                }
                fs::create_dir_all(parent).await.map_err(|e| {
                    StorageError::CreateDirectory(format!("{}: {e}", parent.display()))
                })?;
            }
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(format!(
            ".{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::WriteFile(format!("{}: {e}", path.display())).into());
        }

        Ok(())
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let normalized = if path.is_absolute() {
            normalize_path(&self.root, path)?
        } else {
            normalize_str(&path.to_string_lossy())
        };
        (!normalized.is_empty()).then_some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::render::parse;
    use ctxwatch_directory_watcher::{ChangeEvent, ChangeKind};
    use ctxwatch_git::{DiffRecord, DiffStatus};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn artifact() -> ContextArtifact {
        ContextArtifact::synthesize(
            &ChangeEvent::new("a.ts", ChangeKind::Modified),
            vec![DiffRecord::new("a.ts", DiffStatus::Modified)],
            vec!["b.ts".to_string()],
        )
    }

    #[tokio::test]
    async fn publishes_every_enabled_target() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = ContextPublisher::new(temp_dir.path(), OutputConfig::default());

        let report = publisher.publish(&artifact()).await;
        assert!(report.is_complete());
        assert_eq!(report.published.len(), 2);

        let md = std::fs::read_to_string(temp_dir.path().join("AI_Context/claude/context.md"))
            .unwrap();
        let parsed = parse(OutputFormat::Markdown, &md).unwrap();
        assert_eq!(parsed.changed_files, artifact().changed_files);
        assert_eq!(parsed.related_files, vec!["b.ts"]);

        let json =
            std::fs::read_to_string(temp_dir.path().join("AI_Context/chatgpt/context.json"))
                .unwrap();
        let parsed = parse(OutputFormat::Json, &json).unwrap();
        assert_eq!(parsed.related_files, vec!["b.ts"]);
        assert_eq!(parsed.format, OutputFormat::Json);
    }

    #[tokio::test]
    async fn output_is_overwritten_not_appended() {
        let temp_dir = TempDir::new().unwrap();
        let config = OutputConfig::empty()
            .with_target("notes", TargetConfig::new("notes.txt", OutputFormat::Text));
        let publisher = ContextPublisher::new(temp_dir.path(), config);

        publisher.publish(&artifact()).await;
        let second = ContextArtifact::synthesize(
            &ChangeEvent::new("c.ts", ChangeKind::Added),
            Vec::new(),
            Vec::new(),
        );
        publisher.publish(&second).await;

        let text = std::fs::read_to_string(temp_dir.path().join("notes.txt")).unwrap();
        let parsed = parse(OutputFormat::Text, &text).unwrap();
        assert_eq!(parsed.trigger.path, "c.ts");
        assert!(parsed.changed_files.is_empty());
        assert!(!text.contains("a.ts"));
    }

    #[tokio::test]
    async fn failing_target_does_not_block_others() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = OutputConfig::empty()
            .with_target(
                "broken",
                TargetConfig::new("missing/dir/out.md", OutputFormat::Markdown),
            )
            .with_target(
                "templated",
                TargetConfig::new("t.md", OutputFormat::Markdown).with_template("nope.tpl"),
            )
            .with_target("ok", TargetConfig::new("ok.md", OutputFormat::Markdown));
        config.create_missing_directories = false;
        config.keep_history = false;
        let publisher = ContextPublisher::new(temp_dir.path(), config);

        let report = publisher.publish(&artifact()).await;

        let failed: Vec<_> = report.failures.iter().map(|f| f.target.as_str()).collect();
        assert_eq!(failed, vec!["broken", "templated"]);
        assert_eq!(report.published.len(), 1);
        assert_eq!(report.published[0].target, "ok");
        assert!(temp_dir.path().join("ok.md").exists());
    }

    #[tokio::test]
    async fn template_file_is_rendered() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("ctx.tpl"),
            "{{header}}\nTrigger {{trigger}}\n{{relatedFiles}}\n",
        )
        .unwrap();
        let config = OutputConfig::empty().with_target(
            "custom",
            TargetConfig::new("out/custom.md", OutputFormat::Markdown)
                .with_header("# Custom")
                .with_template("ctx.tpl"),
        );
        let publisher = ContextPublisher::new(temp_dir.path(), config);

        let report = publisher.publish(&artifact()).await;
        assert!(report.is_complete());

        let out = std::fs::read_to_string(temp_dir.path().join("out/custom.md")).unwrap();
        assert_eq!(out, "# Custom\nTrigger `a.ts` (modified)\n- `b.ts`\n");
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let config = OutputConfig::empty()
            .with_target("X", TargetConfig::new("x.md", OutputFormat::Markdown))
            .with_history("history", 2);
        let publisher = ContextPublisher::new(temp_dir.path(), config);
        publisher.ensure_directories().await.unwrap();

        let mut archived = Vec::new();
        for _ in 0..3 {
            let report = publisher.publish(&artifact()).await;
            archived.push(report.published[0].history.clone().unwrap());
        }

        let remaining = publisher.history().unwrap().entries("X").await.unwrap();
        assert_eq!(remaining, vec![archived[2].clone(), archived[1].clone()]);
        assert!(!archived[0].exists());
    }

    #[tokio::test]
    async fn zero_history_bound_archives_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = OutputConfig::empty()
            .with_target("X", TargetConfig::new("x.md", OutputFormat::Markdown))
            .with_history("history", 0);
        let publisher = ContextPublisher::new(temp_dir.path(), config);
        publisher.ensure_directories().await.unwrap();

        let report = publisher.publish(&artifact()).await;

        assert!(report.is_complete());
        assert_eq!(report.published[0].history, None);
        assert!(publisher.history().is_none());
        assert!(temp_dir.path().join("x.md").exists());
        assert!(!temp_dir.path().join("history").exists());
    }

    #[tokio::test]
    async fn disabled_output_publishes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = OutputConfig::default();
        config.enabled = false;
        let publisher = ContextPublisher::new(temp_dir.path(), config);

        let report = publisher.publish(&artifact()).await;
        assert_eq!(report, PublishReport::default());
        assert!(!temp_dir.path().join("AI_Context").exists());
    }

    #[test]
    fn self_exclusions_cover_outputs_and_history() {
        let publisher = ContextPublisher::new("/project", OutputConfig::default());
        assert_eq!(
            publisher.self_exclusions(),
            vec![
                "AI_Context/claude/context.md.*.tmp",
                "AI_Context/claude/context.md",
                "AI_Context/chatgpt/context.json.*.tmp",
                "AI_Context/chatgpt/context.json",
                "AI_Context/history/*",
                "AI_Context/history",
            ]
        );
    }
}
