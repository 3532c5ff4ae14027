//! File events from directory watching.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// Kind of change observed for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Path appeared.
    Added,

    /// Content changed.
    Modified,

    /// Path disappeared.
    Removed,
}

impl ChangeKind {
    /// Map a notify event kind. Access and metadata-only events yield `None`.
    pub fn from_notify(kind: &notify::EventKind) -> Option<Self> {
        match kind {
            notify::EventKind::Create(_) => Some(Self::Added),
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Self::Removed),
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Self::Added),
            notify::EventKind::Modify(ModifyKind::Metadata(_)) => None,
            notify::EventKind::Modify(_) => Some(Self::Modified),
            notify::EventKind::Remove(_) => Some(Self::Removed),
            notify::EventKind::Any => Some(Self::Modified),
            _ => None,
        }
    }

    /// Lower-case label used in logs and rendered artifacts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw file system event, before ignore filtering and debouncing.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// The kind of event.
    pub kind: ChangeKind,

    /// Path to the affected file or directory.
    pub path: PathBuf,

    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new file event.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }

    /// Expand a notify event into per-path file events.
    ///
    /// A two-path rename becomes a removal of the old path and an addition of
    /// the new one.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        if let notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
            if let [from, to] = event.paths.as_slice() {
                return vec![
                    Self::new(ChangeKind::Removed, from.clone()),
                    Self::new(ChangeKind::Added, to.clone()),
                ];
            }
        }

        let Some(kind) = ChangeKind::from_notify(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .into_iter()
            .map(|path| Self::new(kind, path))
            .collect()
    }
}

/// A settled change: emitted once per path after its quiet window elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Normalized project-relative path.
    pub path: String,

    /// The last kind observed during the window.
    pub kind: ChangeKind,

    /// When the change settled.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create a settled change stamped now.
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle signals emitted by the watcher.
#[derive(Debug, Clone)]
pub enum WatchSignal {
    /// All watch targets are registered.
    Ready,

    /// A raw event.
    Event(FileEvent),

    /// The watch subscription failed; the session is no longer trustworthy.
    Fault(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_file_event_creation() {
        let event = FileEvent::new(ChangeKind::Added, "/test/file.txt");
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(event.path, Path::new("/test/file.txt"));
    }

    #[test]
    fn maps_notify_kinds() {
        use notify::EventKind;

        assert_eq!(
            ChangeKind::from_notify(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Added)
        );
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Removed)
        );
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Modify(ModifyKind::Metadata(
                MetadataKind::AccessTime
            ))),
            None
        );
    }

    #[test]
    fn splits_two_path_renames() {
        let event = notify::Event::new(notify::EventKind::Modify(ModifyKind::Name(
            RenameMode::Both,
        )))
        .add_path(PathBuf::from("/p/old.ts"))
        .add_path(PathBuf::from("/p/new.ts"));

        let events = FileEvent::from_notify(event);
        let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.path.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Removed, PathBuf::from("/p/old.ts")),
                (ChangeKind::Added, PathBuf::from("/p/new.ts")),
            ]
        );
    }
}
