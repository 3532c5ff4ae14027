//! The monitor orchestrator.
//!
//! One task owns the [`MonitorState`] and the current [`Snapshot`]. It routes
//! raw watcher events into two independent coalescers (per-file changes and
//! configuration reloads), starts a pipeline task per settled change, and
//! folds pipeline completions back into the state machine.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ctxwatch_directory_watcher::{
    ChangeEvent, ChangeKind, DirectoryWatcher, EventCoalescer, FileEvent, IgnorePolicy,
    WatchSignal, covered_by, normalize_path,
};
use ctxwatch_git::DiffOracle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::pipeline::{self, PipelineReport};
use crate::snapshot::{RELOAD_QUIET, Snapshot};
use crate::state::{Activity, MonitorState};

/// Capacity of the monitor event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Key under which configuration changes are coalesced.
const RELOAD_KEY: &str = "configuration";

/// Something observers of a running monitor may care about.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The watcher registered every target.
    Ready,

    /// The activity state changed.
    Activity(Activity),

    /// A new configuration snapshot is in effect.
    Reloaded,

    /// A pipeline finished.
    Pipeline(PipelineReport),
}

/// Builder for [`Monitor`].
pub struct MonitorBuilder {
    root: PathBuf,
    config_path: Option<PathBuf>,
    oracle: Option<Arc<dyn DiffOracle>>,
}

impl MonitorBuilder {
    /// Create a builder for the project at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_path: None,
            oracle: None,
        }
    }

    /// Use a configuration file other than `<root>/.ctxwatch/config.toml`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Replace the git-backed diff oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn DiffOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Bootstrap the configuration and build the first snapshot.
    ///
    /// Fails only when the project root, the configuration file or the
    /// output directories cannot be set up.
    pub async fn build(self) -> Result<Monitor> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|source| MonitorError::Bootstrap {
                path: self.root.clone(),
                source,
            })?;

        let config_path = match self.config_path {
            Some(path) => std::path::absolute(&path)?,
            None => MonitorConfig::default_path(&root),
        };
        MonitorConfig::bootstrap(&config_path).await?;
        let config_path = canonical_file(&config_path).await;

        let config = MonitorConfig::load(&config_path).await;
        let snapshot = Snapshot::build(&root, &config_path, config, self.oracle.clone()).await;
        snapshot.publisher.ensure_directories().await?;

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Monitor {
            root,
            config_path,
            oracle: self.oracle,
            snapshot: Arc::new(snapshot),
            state: MonitorState::new(),
            events_tx,
        })
    }
}

/// A long-running project monitor.
pub struct Monitor {
    root: PathBuf,
    config_path: PathBuf,

    /// Injected diff oracle, reused across reloads.
    oracle: Option<Arc<dyn DiffOracle>>,

    /// Configuration in effect for newly settled changes.
    snapshot: Arc<Snapshot>,

    state: MonitorState,
    events_tx: broadcast::Sender<MonitorEvent>,
}

impl Monitor {
    /// Create a monitor builder for the project at `root`.
    pub fn builder(root: impl Into<PathBuf>) -> MonitorBuilder {
        MonitorBuilder::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events_tx.subscribe()
    }

    /// Run the pipeline once for `path`, outside of any watch session.
    pub async fn run_once(&self, path: &Path) -> PipelineReport {
        let absolute_path = self.root.join(path);
        let relative = normalize_path(&self.root, &absolute_path)
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let kind = if tokio::fs::try_exists(&absolute_path).await.unwrap_or(false) {
            ChangeKind::Modified
        } else {
            ChangeKind::Removed
        };

        if self.snapshot.ignore.should_ignore(&relative) {
            warn!("{relative} matches an ignore rule; running anyway");
        }
        pipeline::run(Arc::clone(&self.snapshot), ChangeEvent::new(relative, kind)).await
    }

    /// Watch until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Watch until `shutdown` resolves or the watcher faults.
    ///
    /// Pipelines still running at shutdown are allowed to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (watcher, signals) = DirectoryWatcher::new();
        self.watch(watcher, signals, shutdown).await
    }

    async fn watch<F>(
        mut self,
        mut watcher: DirectoryWatcher,
        mut signals: mpsc::Receiver<WatchSignal>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Starting file monitoring in {}", self.root.display());

        let (ignore_tx, ignore_rx) = watch::channel(Arc::clone(&self.snapshot.ignore));
        let (mut changes, mut settled) =
            EventCoalescer::new(self.snapshot.config.debounce(), ignore_rx);
        let (reloads, mut reload_requests) = EventCoalescer::unfiltered(RELOAD_QUIET);
        let mut pipelines: JoinSet<PipelineReport> = JoinSet::new();
        let mut idle = idle_ticker(&self.snapshot.config);

        if let Err(e) = watcher
            .start(&self.snapshot.plan, &self.reload_watch_dirs())
            .await
        {
            return Err(self.fault(e.to_string()));
        }

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutting down");
                    break Ok(());
                }
                signal = signals.recv() => match signal {
                    Some(WatchSignal::Ready) => {
                        info!(
                            "Monitoring file changes ({} ignore rules)",
                            self.snapshot.ignore.len()
                        );
                        self.emit(MonitorEvent::Ready);
                    }
                    Some(WatchSignal::Event(event)) => self.route(event, &changes, &reloads),
                    Some(WatchSignal::Fault(reason)) => break Err(self.fault(reason)),
                    None => break Err(self.fault("watcher channel closed".to_string())),
                },
                Some(change) = settled.recv() => self.start_pipeline(&mut pipelines, change),
                Some(_) = reload_requests.recv() => {
                    if let Err(e) = self
                        .reload(&mut watcher, &ignore_tx, &mut changes, &mut idle)
                        .await
                    {
                        break Err(self.fault(e.to_string()));
                    }
                }
                Some(joined) = pipelines.join_next() => self.finish_pipeline(joined),
                _ = idle.tick() => {
                    if self.state.on_tick() {
                        info!("Status: [IDLE] (no tasks in progress, monitoring for changes)");
                    }
                }
            }
        };

        watcher.stop();
        while let Some(joined) = pipelines.join_next().await {
            self.finish_pipeline(joined);
        }
        outcome
    }

    /// Send a raw event to the reload or the change coalescer.
    fn route(&self, event: FileEvent, changes: &EventCoalescer, reloads: &EventCoalescer) {
        if event.path == self.config_path || event.path == self.snapshot.ignore_file() {
            debug!("Configuration source {} {}", event.path.display(), event.kind);
            reloads.push(RELOAD_KEY, event.kind);
            return;
        }

        let Some(path) = normalize_path(&self.root, &event.path) else {
            trace!("Outside the project: {}", event.path.display());
            return;
        };
        if path.is_empty() || !self.snapshot.plan.accepts(&path) {
            trace!("Not a watch target: {path}");
            return;
        }

        changes.push(path, event.kind);
    }

    fn start_pipeline(&mut self, pipelines: &mut JoinSet<PipelineReport>, change: ChangeEvent) {
        if !self.state.begin() {
            return;
        }
        if self.state.in_flight() == 1 {
            self.emit(MonitorEvent::Activity(Activity::Active));
        }
        pipelines.spawn(pipeline::run(Arc::clone(&self.snapshot), change));
    }

    fn finish_pipeline(
        &mut self,
        joined: std::result::Result<PipelineReport, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(report) => {
                debug!(
                    "Pipeline for {} done: {} published, {} failed",
                    report.trigger.path,
                    report.publish.published.len(),
                    report.publish.failures.len()
                );
                self.emit(MonitorEvent::Pipeline(report));
            }
            Err(e) => error!("Pipeline task failed: {e:?}"),
        }

        if self.state.complete() {
            info!("All tasks complete");
            self.emit(MonitorEvent::Activity(Activity::Idle));
        }
    }

    /// Load the configuration again and swap in a new snapshot.
    async fn reload(
        &mut self,
        watcher: &mut DirectoryWatcher,
        ignore_tx: &watch::Sender<Arc<IgnorePolicy>>,
        changes: &mut EventCoalescer,
        idle: &mut Interval,
    ) -> Result<()> {
        info!("Configuration changed. Reloading...");

        let config = MonitorConfig::load(&self.config_path).await;
        let snapshot =
            Snapshot::build(&self.root, &self.config_path, config, self.oracle.clone()).await;
        if let Err(e) = snapshot.publisher.ensure_directories().await {
            warn!("{e}");
        }

        if snapshot.config.idle_interval() != self.snapshot.config.idle_interval() {
            *idle = idle_ticker(&snapshot.config);
        }
        changes.set_quiet(snapshot.config.debounce());
        ignore_tx.send_replace(Arc::clone(&snapshot.ignore));
        let dirs = config_watch_dirs(&self.config_path, &snapshot);
        watcher.rewatch(&snapshot.plan, &dirs)?;

        self.snapshot = Arc::new(snapshot);
        info!("Configuration successfully reloaded");
        self.emit(MonitorEvent::Reloaded);
        Ok(())
    }

    fn reload_watch_dirs(&self) -> Vec<PathBuf> {
        config_watch_dirs(&self.config_path, &self.snapshot)
    }

    fn fault(&mut self, reason: String) -> MonitorError {
        error!("Watcher fault: {reason}");
        self.state.set_fault(reason.clone());
        self.emit(MonitorEvent::Activity(Activity::Error));
        MonitorError::WatcherFault(reason)
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}

/// Interval whose first tick is one full period away.
fn idle_ticker(config: &MonitorConfig) -> Interval {
    let period = config.idle_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Canonicalize a file's directory so it compares equal to watcher paths.
async fn canonical_file(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => tokio::fs::canonicalize(dir)
            .await
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Directories to watch for configuration and ignore-file changes that the
/// snapshot's watch plan does not already cover.
fn config_watch_dirs(config_path: &Path, snapshot: &Snapshot) -> Vec<PathBuf> {
    let registrations = snapshot.plan.registrations();
    let mut dirs: Vec<PathBuf> = Vec::new();
    for file in [config_path.to_path_buf(), snapshot.ignore_file()] {
        let Some(dir) = file.parent() else {
            continue;
        };
        if !covered_by(dir, registrations) && !dirs.iter().any(|d| d == dir) {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs
}
