//! Error types for the monitor.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur in the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The configuration file is missing or unreadable.
    #[error("configuration unavailable at {}: {source}", path.display())]
    ConfigUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("malformed configuration at {}: {reason}", path.display())]
    ConfigMalformed { path: PathBuf, reason: String },

    /// A directory or file required at startup could not be created.
    #[error("bootstrap failed for {}: {source}", path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watch subscription itself failed.
    #[error("watcher fault: {0}")]
    WatcherFault(String),

    /// Directory watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] ctxwatch_directory_watcher::WatcherError),

    /// Context publishing error.
    #[error("context error: {0}")]
    Context(#[from] ctxwatch_context_files::ContextError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
