//! Error types for the diff adapter.
//!
//! Every variant means the same thing to callers: the diff is unavailable
//! for this invocation and the pipeline should carry on without it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for diff operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// Reasons a diff could not be produced.
#[derive(Error, Debug)]
pub enum GitError {
    /// The repository path does not exist.
    #[error("diff unavailable: path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The path is not inside a git working tree.
    #[error("diff unavailable: not a git work tree: {}", .0.display())]
    NotARepository(PathBuf),

    /// git ran but exited non-zero.
    #[error("diff unavailable: `git {command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// git did not finish in time.
    #[error("diff unavailable: `git {command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// git could not be started.
    #[error("diff unavailable: failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}
