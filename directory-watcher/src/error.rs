//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// A glob pattern could not be compiled.
    #[error("invalid pattern `{pattern}`: {reason}")]
    PatternInvalid { pattern: String, reason: String },

    /// The ignore file could not be read.
    #[error("ignore file unavailable: {}: {source}", path.display())]
    IgnoreSourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watch subscription itself failed.
    #[error("watcher fault: {0}")]
    WatcherFault(String),

    /// Watcher not started yet.
    #[error("watcher is not running")]
    NotRunning,

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
