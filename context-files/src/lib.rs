//! # Context Files
//!
//! This crate turns a settled change into context artifacts for downstream
//! consumers such as AI coding assistants. It provides:
//!
//! - **Synthesis**: trigger, diff records and related files combined into one [`ContextArtifact`]
//! - **Rendering**: markdown, JSON and plain-text layouts, plus template files
//! - **Read-back**: every built-in layout parses back into the artifact it came from
//! - **Publishing**: per-target writes with isolated failures
//! - **History**: timestamp-named archives with a per-target retention bound
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Context Files                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ChangeEvent + DiffRecords + related ──► ContextArtifact        │
//! │                                               │                 │
//! │                                               ▼                 │
//! │  OutputConfig ──► ContextPublisher ──► render ──► target file   │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                    HistoryStore ──► <target>_<timestamp>.<ext>  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod history;
pub mod publisher;
pub mod render;

pub use artifact::{ContextArtifact, StatusCounts, Trigger};
pub use config::{OutputConfig, OutputFormat, TargetConfig};
pub use error::{ContextError, Result, StorageError};
pub use history::HistoryStore;
pub use publisher::{ContextPublisher, PublishReport, PublishedTarget, TargetFailure};
pub use render::{parse, render, render_template};
