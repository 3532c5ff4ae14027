//! # Directory Watcher
//!
//! This crate turns raw file system activity into settled, filtered changes
//! for the ctxwatch monitor.
//!
//! ## Features
//!
//! - **Real-time Watching**: notify-backed subscription on planned watch targets
//! - **Ignore Policy**: defaults, ignore-file rules and configured globs as one predicate
//! - **Debouncing**: per-path quiet windows that collapse bursts into one change
//! - **Glob-lite Patterns**: one matcher shared by every component
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchPlan ──► DirectoryWatcher ──► WatchSignal                 │
//! │                                          │                      │
//! │                                          ▼                      │
//! │  IgnorePolicy ─────────────────► EventCoalescer ──► ChangeEvent │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod ignore;
pub mod pattern;
pub mod watcher;

pub use config::{WatchPlan, WatchTarget, covered_by};
pub use debounce::EventCoalescer;
pub use error::{Result, WatcherError};
pub use event::{ChangeEvent, ChangeKind, FileEvent, WatchSignal};
pub use ignore::{IgnorePolicy, IgnoreRule, RuleSource};
pub use pattern::{MatchStyle, Pattern, normalize_path, normalize_str};
pub use watcher::DirectoryWatcher;

pub use notify::RecursiveMode;
