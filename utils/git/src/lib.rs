//! Version-control diff adapter.
//!
//! Asks git which files differ from a reference and normalizes the answer
//! into [`DiffRecord`]s. git being absent, the path not being a repository,
//! a non-zero exit or a hung process are all ordinary outcomes here: callers
//! use [`DiffOracle::changes_or_empty`] and keep going.

pub mod config;
pub mod diff;
pub mod error;
pub mod oracle;

pub use config::GitConfig;
pub use diff::{DiffRecord, DiffStatus};
pub use error::{GitError, Result};
pub use oracle::{DiffMode, DiffOracle, GitDiffOracle};
