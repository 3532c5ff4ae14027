//! Error types for context artifact publishing.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors that can occur while rendering, writing or archiving artifacts.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Publishing to one output target failed.
    #[error("failed to publish context for target '{target}': {source}")]
    Publish {
        target: String,
        #[source]
        source: Box<ContextError>,
    },

    /// A target's template file could not be read.
    #[error("failed to read template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A rendered artifact could not be read back.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl ContextError {
    /// Wrap an error as a publish failure for `target`.
    pub fn publish(target: impl Into<String>, source: ContextError) -> Self {
        Self::Publish {
            target: target.into(),
            source: Box::new(source),
        }
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create an output or history directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// The directory an artifact should be written to does not exist.
    #[error("missing directory: {0}")]
    MissingDirectory(String),

    /// Failed to read a file or directory listing.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write an artifact or history entry.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// Failed to delete an expired history entry.
    #[error("failed to delete file: {0}")]
    DeleteFile(String),
}
