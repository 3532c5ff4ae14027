//! Rendering artifacts per output format, and reading them back.
//!
//! Every built-in layout parses back into the [`ContextArtifact`] it was
//! rendered from. Template-file output is free-form and is not parsed.

use chrono::{DateTime, SecondsFormat, Utc};
use ctxwatch_directory_watcher::ChangeKind;
use ctxwatch_git::{DiffRecord, DiffStatus};
use serde::{Deserialize, Serialize};

use crate::artifact::{ContextArtifact, StatusCounts, Trigger};
use crate::config::{OutputFormat, TargetConfig};
use crate::error::{ContextError, Result};

const CHANGED_HEADING: &str = "Changed Files";
const RELATED_HEADING: &str = "Related Files";
const NO_CHANGES: &str = "_No changes detected_";
const NO_RELATED: &str = "_None_";

/// JSON form: the artifact plus its status counts.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonDocument {
    #[serde(flatten)]
    artifact: ContextArtifact,
    #[serde(default)]
    git_status: StatusCounts,
}

/// Render `artifact` in the built-in layout of `target`'s format.
pub fn render(artifact: &ContextArtifact, target: &TargetConfig) -> Result<String> {
    let artifact = artifact.with_format(target.format);
    match target.format {
        OutputFormat::Markdown => Ok(render_markdown(&artifact, &target.header_template)),
        OutputFormat::Json => {
            let document = JsonDocument {
                git_status: artifact.counts(),
                artifact,
            };
            Ok(serde_json::to_string_pretty(&document)?)
        }
        OutputFormat::Text => Ok(render_text(&artifact, &target.header_template)),
    }
}

/// Substitute the `{{placeholder}}` fields of a template file.
pub fn render_template(template: &str, artifact: &ContextArtifact, target: &TargetConfig) -> String {
    let counts = artifact.counts();
    let branch = artifact.branch.as_deref().unwrap_or("unknown");

    let changes = if artifact.changed_files.is_empty() {
        NO_CHANGES.to_string()
    } else {
        artifact
            .changed_files
            .iter()
            .map(markdown_change)
            .collect::<Vec<_>>()
            .join("\n")
    };
    let related = if artifact.related_files.is_empty() {
        NO_RELATED.to_string()
    } else {
        artifact
            .related_files
            .iter()
            .map(|path| format!("- `{path}`"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let git_status = format!(
        "Added: {}, Modified: {}, Deleted: {}",
        counts.added, counts.modified, counts.deleted
    );

    [
        ("{{header}}", target.header_template.clone()),
        ("{{changes}}", changes),
        ("{{relatedFiles}}", related),
        ("{{gitStatus}}", git_status),
        ("{{timestamp}}", timestamp(artifact.timestamp)),
        ("{{branch}}", branch.to_string()),
        ("{{totalChanges}}", counts.total().to_string()),
        ("{{addedCount}}", counts.added.to_string()),
        ("{{modifiedCount}}", counts.modified.to_string()),
        ("{{deletedCount}}", counts.deleted.to_string()),
        ("{{trigger}}", trigger_label(&artifact.trigger)),
    ]
    .iter()
    .fold(template.to_string(), |out, (placeholder, value)| {
        out.replace(placeholder, value)
    })
}

/// Read back an artifact rendered with [`render`].
pub fn parse(format: OutputFormat, content: &str) -> Result<ContextArtifact> {
    match format {
        OutputFormat::Markdown => parse_markdown(content),
        OutputFormat::Json => {
            let document: JsonDocument = serde_json::from_str(content)?;
            Ok(document.artifact)
        }
        OutputFormat::Text => parse_text(content),
    }
}

fn render_markdown(artifact: &ContextArtifact, header: &str) -> String {
    let mut out = String::new();
    if !header.is_empty() {
        out.push_str(header);
        out.push_str("\n\n");
    }

    out.push_str(&format!("- Timestamp: {}\n", timestamp(artifact.timestamp)));
    out.push_str(&format!("- Trigger: {}\n", trigger_label(&artifact.trigger)));
    if let Some(branch) = &artifact.branch {
        out.push_str(&format!("- Branch: {branch}\n"));
    }

    out.push_str(&format!("\n### {CHANGED_HEADING}\n"));
    if artifact.changed_files.is_empty() {
        out.push_str(NO_CHANGES);
        out.push('\n');
    }
    for record in &artifact.changed_files {
        out.push_str(&markdown_change(record));
        out.push('\n');
    }

    if !artifact.related_files.is_empty() {
        out.push_str(&format!("\n### {RELATED_HEADING}\n"));
        for path in &artifact.related_files {
            out.push_str(&format!("- `{path}`\n"));
        }
    }

    out
}

fn render_text(artifact: &ContextArtifact, header: &str) -> String {
    let mut out = String::new();
    if !header.is_empty() {
        out.push_str(header);
        out.push('\n');
    }

    out.push_str(&format!("Timestamp: {}\n", timestamp(artifact.timestamp)));
    out.push_str(&format!(
        "Trigger: {} {}\n",
        artifact.trigger.kind, artifact.trigger.path
    ));
    if let Some(branch) = &artifact.branch {
        out.push_str(&format!("Branch: {branch}\n"));
    }

    out.push_str(&format!("\n{CHANGED_HEADING}:\n"));
    for record in &artifact.changed_files {
        out.push_str(&format!("  {} {}\n", record.status, record.path));
    }
    out.push_str(&format!("{RELATED_HEADING}:\n"));
    for path in &artifact.related_files {
        out.push_str(&format!("  {path}\n"));
    }

    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Changed,
    Related,
    Other,
}

/// Fields common to the markdown and text readers.
#[derive(Default)]
struct Fields {
    timestamp: Option<DateTime<Utc>>,
    trigger: Option<Trigger>,
    branch: Option<String>,
    changed_files: Vec<DiffRecord>,
    related_files: Vec<String>,
}

impl Fields {
    fn finish(self, format: OutputFormat) -> Result<ContextArtifact> {
        let timestamp = self
            .timestamp
            .ok_or_else(|| ContextError::InvalidFormat("missing timestamp".to_string()))?;
        let trigger = self
            .trigger
            .ok_or_else(|| ContextError::InvalidFormat("missing trigger".to_string()))?;

        Ok(ContextArtifact {
            timestamp,
            trigger,
            branch: self.branch,
            changed_files: self.changed_files,
            related_files: self.related_files,
            format,
        })
    }
}

fn parse_markdown(content: &str) -> Result<ContextArtifact> {
    let mut fields = Fields::default();
    let mut section = Section::Preamble;

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("### ") {
            section = match heading.trim() {
                CHANGED_HEADING => Section::Changed,
                RELATED_HEADING => Section::Related,
                _ => Section::Other,
            };
            continue;
        }

        match section {
            Section::Preamble => {
                if let Some(value) = line.strip_prefix("- Timestamp: ") {
                    fields.timestamp = Some(parse_timestamp(value)?);
                } else if let Some(value) = line.strip_prefix("- Trigger: ") {
                    let (path, kind) = split_code_suffix(value)
                        .ok_or_else(|| invalid_line("trigger", line))?;
                    fields.trigger = Some(Trigger {
                        path: path.to_string(),
                        kind: parse_kind(kind)?,
                    });
                } else if let Some(value) = line.strip_prefix("- Branch: ") {
                    fields.branch = Some(value.trim().to_string());
                }
            }
            Section::Changed => {
                if let Some(item) = line.strip_prefix("- ") {
                    let (path, status) =
                        split_code_suffix(item).ok_or_else(|| invalid_line("change", line))?;
                    fields
                        .changed_files
                        .push(DiffRecord::new(path, parse_status(status)?));
                }
            }
            Section::Related => {
                if let Some(path) = line
                    .strip_prefix("- `")
                    .and_then(|rest| rest.strip_suffix('`'))
                {
                    fields.related_files.push(path.to_string());
                }
            }
            Section::Other => {}
        }
    }

    fields.finish(OutputFormat::Markdown)
}

fn parse_text(content: &str) -> Result<ContextArtifact> {
    let mut fields = Fields::default();
    let mut section = Section::Preamble;

    for line in content.lines() {
        if line == format!("{CHANGED_HEADING}:") {
            section = Section::Changed;
            continue;
        }
        if line == format!("{RELATED_HEADING}:") {
            section = Section::Related;
            continue;
        }

        match (section, line.strip_prefix("  ")) {
            (Section::Preamble, _) => {
                if let Some(value) = line.strip_prefix("Timestamp: ") {
                    fields.timestamp = Some(parse_timestamp(value)?);
                } else if let Some(value) = line.strip_prefix("Trigger: ") {
                    let (kind, path) = value
                        .split_once(' ')
                        .ok_or_else(|| invalid_line("trigger", line))?;
                    fields.trigger = Some(Trigger {
                        path: path.to_string(),
                        kind: parse_kind(kind)?,
                    });
                } else if let Some(value) = line.strip_prefix("Branch: ") {
                    fields.branch = Some(value.trim().to_string());
                }
            }
            (Section::Changed, Some(item)) => {
                let (status, path) = item
                    .split_once(' ')
                    .ok_or_else(|| invalid_line("change", line))?;
                fields
                    .changed_files
                    .push(DiffRecord::new(path, parse_status(status)?));
            }
            (Section::Related, Some(path)) => fields.related_files.push(path.to_string()),
            _ => {}
        }
    }

    fields.finish(OutputFormat::Text)
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ContextError::InvalidFormat(format!("bad timestamp '{value}': {e}")))
}

fn markdown_change(record: &DiffRecord) -> String {
    format!("- `{}` ({})", record.path, record.status)
}

fn trigger_label(trigger: &Trigger) -> String {
    format!("`{}` ({})", trigger.path, trigger.kind)
}

/// Split "`path` (suffix)" into its parts.
fn split_code_suffix(value: &str) -> Option<(&str, &str)> {
    let (path, suffix) = value.strip_prefix('`')?.rsplit_once("` (")?;
    Some((path, suffix.strip_suffix(')')?))
}

fn parse_kind(value: &str) -> Result<ChangeKind> {
    match value {
        "added" => Ok(ChangeKind::Added),
        "modified" => Ok(ChangeKind::Modified),
        "removed" => Ok(ChangeKind::Removed),
        other => Err(ContextError::InvalidFormat(format!(
            "unknown change kind '{other}'"
        ))),
    }
}

fn parse_status(value: &str) -> Result<DiffStatus> {
    match value {
        "added" => Ok(DiffStatus::Added),
        "modified" => Ok(DiffStatus::Modified),
        "deleted" => Ok(DiffStatus::Deleted),
        "unknown" => Ok(DiffStatus::Unknown),
        other => Err(ContextError::InvalidFormat(format!(
            "unknown diff status '{other}'"
        ))),
    }
}

fn invalid_line(what: &str, line: &str) -> ContextError {
    ContextError::InvalidFormat(format!("malformed {what} line: {line}"))
}
