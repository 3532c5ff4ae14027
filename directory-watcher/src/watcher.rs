//! Directory watcher implementation.

use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::WatchPlan;
use crate::error::{Result, WatcherError};
use crate::event::{ChangeKind, FileEvent, WatchSignal};

/// Capacity of the raw signal channel.
const SIGNAL_CHANNEL_CAPACITY: usize = 1000;

/// Directory watcher that monitors file system changes.
///
/// Raw events, readiness and faults all arrive on the receiver returned by
/// [`DirectoryWatcher::new`].
pub struct DirectoryWatcher {
    /// Internal notify watcher.
    watcher: Option<RecommendedWatcher>,

    /// Currently registered directories.
    registered: Vec<(PathBuf, RecursiveMode)>,

    /// Extra single paths watched outside the plan (config and ignore files).
    extra: Vec<PathBuf>,

    /// Signal sender.
    signal_tx: mpsc::Sender<WatchSignal>,
}

impl DirectoryWatcher {
    /// Create a new directory watcher and its signal receiver.
    pub fn new() -> (Self, mpsc::Receiver<WatchSignal>) {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        let watcher = Self {
            watcher: None,
            registered: Vec::new(),
            extra: Vec::new(),
            signal_tx,
        };

        (watcher, signal_rx)
    }

    /// Start watching the plan's targets plus the given extra paths.
    ///
    /// Sends [`WatchSignal::Ready`] once everything is registered.
    pub async fn start(&mut self, plan: &WatchPlan, extra: &[PathBuf]) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(()); // Already running
        }

        let signal_tx = self.signal_tx.clone();
        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    // Runs on the notify thread.
                    for file_event in FileEvent::from_notify(event)
                        .into_iter()
                        .filter(|e| !is_directory_event(e))
                    {
                        if signal_tx.blocking_send(WatchSignal::Event(file_event)).is_err() {
                            return; // receiver dropped, shutdown
                        }
                    }
                }
                Err(e) if is_transient(&e) => {
                    warn!("Transient watch error: {e}");
                }
                Err(e) => {
                    error!("Watch error: {e}");
                    let _ = signal_tx.blocking_send(WatchSignal::Fault(e.to_string()));
                }
            },
        )?;
        self.watcher = Some(watcher);

        self.register(plan)?;
        for path in extra {
            self.watch_extra(path.clone());
        }

        self.signal_tx
            .send(WatchSignal::Ready)
            .await
            .map_err(|_| WatcherError::WatcherFault("signal receiver dropped".to_string()))?;
        info!("Directory watcher started");
        Ok(())
    }

    /// Replace the watched targets and extra paths.
    pub fn rewatch(&mut self, plan: &WatchPlan, extra: &[PathBuf]) -> Result<()> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatcherError::NotRunning);
        };

        for path in self.extra.drain(..) {
            if let Err(e) = watcher.unwatch(&path) {
                debug!("Failed to unwatch {}: {e}", path.display());
            }
        }
        for (path, _) in self.registered.drain(..) {
            if let Err(e) = watcher.unwatch(&path) {
                debug!("Failed to unwatch {}: {e}", path.display());
            }
        }

        self.register(plan)?;
        for path in extra {
            self.watch_extra(path.clone());
        }

        info!(
            "Watch targets replaced ({} registrations, {} extra)",
            self.registered.len(),
            self.extra.len()
        );
        Ok(())
    }

    /// Stop watching all directories.
    pub fn stop(&mut self) {
        if let Some(ref mut watcher) = self.watcher {
            for (path, _) in &self.registered {
                let _ = watcher.unwatch(path);
            }
            for path in &self.extra {
                let _ = watcher.unwatch(path);
            }
        }

        self.registered.clear();
        self.extra.clear();
        self.watcher = None;
        info!("Directory watcher stopped");
    }

    /// Check if the watcher is running.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Directories currently registered with the OS watcher.
    pub fn registered(&self) -> &[(PathBuf, RecursiveMode)] {
        &self.registered
    }

    /// Another sender into this watcher's signal channel.
    pub fn signal_sender(&self) -> mpsc::Sender<WatchSignal> {
        self.signal_tx.clone()
    }

    fn register(&mut self, plan: &WatchPlan) -> Result<()> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatcherError::NotRunning);
        };

        for (path, mode) in plan.registrations() {
            // The root must be watchable; anything below it may come and go.
            match watcher.watch(path, *mode) {
                Ok(()) => {
                    debug!("Started watching: {} ({mode:?})", path.display());
                    self.registered.push((path.clone(), *mode));
                }
                Err(e) if path == plan.root() => return Err(e.into()),
                Err(e) => warn!("Failed to watch {}: {e}", path.display()),
            }
        }

        Ok(())
    }

    fn watch_extra(&mut self, path: PathBuf) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        match watcher.watch(&path, RecursiveMode::NonRecursive) {
            Ok(()) => debug!("Started watching: {}", path.display()),
            Err(e) => debug!("Not watching {}: {e}", path.display()),
        }
        self.extra.push(path);
    }
}

/// Only files settle into changes. A removed path can no longer be inspected
/// and is passed through.
fn is_directory_event(event: &FileEvent) -> bool {
    event.kind != ChangeKind::Removed && event.path.is_dir()
}

/// Errors about a single vanished path do not invalidate the session.
fn is_transient(error: &notify::Error) -> bool {
    matches!(
        error.kind,
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound
    )
}
