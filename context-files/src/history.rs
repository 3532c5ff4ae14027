//! Bounded per-target history of published artifacts.
//!
//! Entries are named `<target>_<timestamp>.<ext>` where the timestamp is an
//! ISO-8601 instant with `:` and `.` replaced by `-`, so name order is time
//! order. Several pipelines may archive into the same directory at once:
//! names come from a per-target monotonic clock and are created with
//! `create_new`, and retention tolerates entries that vanish underneath it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StorageError};

/// Timestamp layout inside entry names.
const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Attempts at finding a free name before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

/// History directory with a retention bound per target.
#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    max_files: usize,

    /// Last millisecond handed out per target.
    clocks: Mutex<HashMap<String, i64>>,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            max_files,
            clocks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Write an immutable copy of `content` and enforce retention.
    pub async fn archive(&self, target: &str, extension: &str, content: &str) -> Result<PathBuf> {
        let path = self.write_entry(target, extension, content).await?;
        let removed = self.enforce_retention(target).await?;
        if removed > 0 {
            debug!("Removed {removed} expired history entries for {target}");
        }
        Ok(path)
    }

    /// History entries of `target`, newest first.
    pub async fn entries(&self, target: &str) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(
                    StorageError::ReadFile(format!("{}: {e}", self.dir.display())).into(),
                );
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::ReadFile(format!("{}: {e}", self.dir.display())))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_entry_of(&name, target) {
                names.push(name);
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names.into_iter().map(|name| self.dir.join(name)).collect())
    }

    /// Delete all but the newest `max_files` entries of `target`.
    ///
    /// Returns how many entries this call removed. Entries already removed
    /// by a concurrent call are not an error.
    pub async fn enforce_retention(&self, target: &str) -> Result<usize> {
        let mut removed = 0;
        for path in self.entries(target).await?.into_iter().skip(self.max_files) {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(
                        StorageError::DeleteFile(format!("{}: {e}", path.display())).into(),
                    );
                }
            }
        }
        Ok(removed)
    }

    async fn write_entry(&self, target: &str, extension: &str, content: &str) -> Result<PathBuf> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .dir
                .join(entry_name(target, self.next_instant(target), extension));

            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(file) => file,
                // Another process archived the same instant.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(
                        StorageError::WriteFile(format!("{}: {e}", path.display())).into(),
                    );
                }
            };

            file.write_all(content.as_bytes())
                .await
                .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;
            file.flush()
                .await
                .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;

            info!("Archived context for {target}: {}", path.display());
            return Ok(path);
        }

        Err(StorageError::WriteFile(format!(
            "no free history name for {target} in {}",
            self.dir.display()
        ))
        .into())
    }

    /// Strictly increasing millisecond instants per target.
    fn next_instant(&self, target: &str) -> DateTime<Utc> {
        let now = Utc::now();
        let mut clocks = self.clocks.lock().unwrap_or_else(PoisonError::into_inner);
        let last = clocks.entry(target.to_string()).or_insert(i64::MIN);
        let millis = now.timestamp_millis().max(last.saturating_add(1));
        *last = millis;
        DateTime::from_timestamp_millis(millis).unwrap_or(now)
    }
}

/// `claude_2024-01-01T12-00-00-000Z.md`
pub fn entry_name(target: &str, instant: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{target}_{}.{extension}",
        instant.format(STAMP_FORMAT)
    )
}

/// Whether `name` is a history entry of `target`.
///
/// Everything between `<target>_` and the extension must be a timestamp, so
/// `app` never claims entries of `app_v2` or `app_2`.
fn is_entry_of(name: &str, target: &str) -> bool {
    name.strip_prefix(target)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.split_once('.'))
        .is_some_and(|(stamp, _)| NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn entry_names_replace_separators() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(
            entry_name("claude", instant, "md"),
            "claude_2024-03-05T14-07-09-042Z.md"
        );
    }

    #[test]
    fn entry_prefix_requires_timestamp() {
        assert!(is_entry_of("app_2024-01-01T00-00-00-000Z.md", "app"));
        assert!(!is_entry_of("app_v2_2024-01-01T00-00-00-000Z.md", "app"));
        assert!(!is_entry_of("apple_2024-01-01T00-00-00-000Z.md", "app"));
        assert!(!is_entry_of("app.md", "app"));
        assert!(!is_entry_of("app_2_2024-01-01T00-00-00-000Z.md", "app"));
        assert!(!is_entry_of("app_2024-01-01.md", "app"));
        assert!(is_entry_of("app_2_2024-01-01T00-00-00-000Z.md", "app_2"));
    }

    #[test]
    fn instants_strictly_increase() {
        let store = HistoryStore::new("/unused", 1);
        let a = store.next_instant("x");
        let b = store.next_instant("x");
        let c = store.next_instant("x");
        assert!(a < b && b < c);
        assert!(entry_name("x", a, "md") < entry_name("x", b, "md"));
    }

    #[tokio::test]
    async fn retention_keeps_newest_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::new(temp_dir.path(), 2);

        let first = store.archive("X", "md", "one").await.unwrap();
        let second = store.archive("X", "md", "two").await.unwrap();
        let third = store.archive("X", "md", "three").await.unwrap();

        let entries = store.entries("X").await.unwrap();
        assert_eq!(entries, vec![third, second]);
        assert!(!first.exists());
    }

    #[tokio::test]
    async fn retention_is_per_target() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::new(temp_dir.path(), 1);

        store.archive("a", "md", "a1").await.unwrap();
        store.archive("b", "json", "b1").await.unwrap();
        store.archive("a", "md", "a2").await.unwrap();

        assert_eq!(store.entries("a").await.unwrap().len(), 1);
        assert_eq!(store.entries("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retention_ignores_targets_sharing_a_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::new(temp_dir.path(), 1);

        let other = store.archive("a_2", "md", "other").await.unwrap();
        let own = store.archive("a", "md", "own").await.unwrap();

        assert_eq!(store.entries("a").await.unwrap(), vec![own.clone()]);
        assert_eq!(store.entries("a_2").await.unwrap(), vec![other.clone()]);
        assert!(own.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn retention_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::new(temp_dir.path(), 1);
        for i in 0..3 {
            store.write_entry("X", "txt", &i.to_string()).await.unwrap();
        }

        let (a, b) = tokio::join!(store.enforce_retention("X"), store.enforce_retention("X"));
        assert_eq!(a.unwrap() + b.unwrap(), 2);
        assert_eq!(store.enforce_retention("X").await.unwrap(), 0);
        assert_eq!(store.entries("X").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_has_no_entries() {
        let store = HistoryStore::new("/nonexistent/history/12345", 3);
        assert!(store.entries("X").await.unwrap().is_empty());
    }
}
