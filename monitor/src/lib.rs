//! # Monitor
//!
//! The `ctxwatch` orchestrator. Loads the project configuration, watches the
//! tree, and for every settled change resolves related files, asks git what
//! changed and publishes a context artifact for each output target.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Monitor                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  DirectoryWatcher ──► route ──► EventCoalescer ──► pipeline::run │
//! │                         │                             │          │
//! │                         ▼                             ▼          │
//! │                reload coalescer ──► Snapshot   MonitorEvent      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use ctxwatch_monitor::Monitor;
//!
//! # async fn example() -> ctxwatch_monitor::Result<()> {
//! let monitor = Monitor::builder("/path/to/project").build().await?;
//! monitor.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dependency_map;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod snapshot;
pub mod state;

pub use cli::Cli;
pub use config::MonitorConfig;
pub use dependency_map::DependencyMap;
pub use error::{MonitorError, Result};
pub use orchestrator::{Monitor, MonitorBuilder, MonitorEvent};
pub use pipeline::PipelineReport;
pub use snapshot::Snapshot;
pub use state::{Activity, MonitorState};
