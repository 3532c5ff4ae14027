//! Output target configuration.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Serialization format of a published artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Markdown document with a header template.
    #[default]
    Markdown,
    /// Pretty-printed JSON.
    Json,
    /// Plain text.
    Text,
}

impl OutputFormat {
    /// File extension used for history entries.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Text => "txt",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downstream consumer of context artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetConfig {
    pub enabled: bool,

    /// Output file, relative to the project root.
    pub output_path: PathBuf,

    pub format: OutputFormat,

    /// First line(s) of markdown and text output.
    pub header_template: String,

    /// Optional template file rendered instead of the built-in layout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_path: PathBuf::from("AI_Context/context.md"),
            format: OutputFormat::Markdown,
            header_template: "# Project Update Context".to_string(),
            template_path: None,
        }
    }
}

impl TargetConfig {
    /// Create an enabled target writing `format` to `output_path`.
    pub fn new(output_path: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            output_path: output_path.into(),
            format,
            ..Self::default()
        }
    }

    /// Set the header template.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header_template = header.into();
        self
    }

    /// Render through a template file.
    pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }
}

/// The `outputConfig` section of the monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    /// Master switch for publishing.
    pub enabled: bool,

    /// Targets by name, in document order.
    pub targets: IndexMap<String, TargetConfig>,

    /// Archive every published artifact.
    pub keep_history: bool,

    /// History directory, relative to the project root.
    pub history_path: PathBuf,

    /// Retention bound per target.
    pub max_history_files: usize,

    /// Create output and history directories when missing.
    pub create_missing_directories: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let mut targets = IndexMap::new();
        targets.insert(
            "claude".to_string(),
            TargetConfig::new("AI_Context/claude/context.md", OutputFormat::Markdown),
        );
        targets.insert(
            "chatgpt".to_string(),
            TargetConfig::new("AI_Context/chatgpt/context.json", OutputFormat::Json)
                .with_header(""),
        );

        Self {
            enabled: true,
            targets,
            keep_history: true,
            history_path: PathBuf::from("AI_Context/history"),
            max_history_files: 10,
            create_missing_directories: true,
        }
    }
}

impl OutputConfig {
    /// Configuration with no targets.
    pub fn empty() -> Self {
        Self {
            targets: IndexMap::new(),
            ..Self::default()
        }
    }

    /// Add or replace a target.
    pub fn with_target(mut self, name: impl Into<String>, target: TargetConfig) -> Self {
        self.targets.insert(name.into(), target);
        self
    }

    /// Set history retention.
    pub fn with_history(mut self, path: impl Into<PathBuf>, max_files: usize) -> Self {
        self.keep_history = true;
        self.history_path = path.into();
        self.max_history_files = max_files;
        self
    }

    /// Enabled targets in declaration order.
    pub fn enabled_targets(&self) -> impl Iterator<Item = (&str, &TargetConfig)> {
        self.targets
            .iter()
            .filter(|(_, target)| target.enabled)
            .map(|(name, target)| (name.as_str(), target))
    }
}
