//! Per-path debouncing of raw events.
//!
//! The coalescer keeps one pending timer per path. A new raw event for a path
//! replaces the pending entry (restarting its timer and overwriting its kind),
//! so a burst settles into exactly one [`ChangeEvent`] carrying the last kind.
//! Each entry carries a generation number; a timer only settles the entry it
//! was armed for, which keeps a superseded timer from firing even if its abort
//! arrives late. Different paths settle independently and in no particular
//! order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::event::{ChangeEvent, ChangeKind};
use crate::ignore::IgnorePolicy;

/// Capacity of the settled-event channel.
const SETTLED_CHANNEL_CAPACITY: usize = 1024;

struct Pending {
    kind: ChangeKind,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    entries: HashMap<String, Pending>,
    next_generation: u64,
}

/// Collapses bursts of raw events into settled changes.
pub struct EventCoalescer {
    /// Quiet period a path must see before it settles.
    quiet: Duration,

    /// Current ignore policy, swapped wholesale on reload.
    ignore: watch::Receiver<Arc<IgnorePolicy>>,

    /// Path → pending timer.
    table: Arc<Mutex<TimerTable>>,

    /// Settled events go here.
    settled_tx: mpsc::Sender<ChangeEvent>,
}

impl EventCoalescer {
    /// Create a coalescer filtered by the given ignore policy.
    pub fn new(
        quiet: Duration,
        ignore: watch::Receiver<Arc<IgnorePolicy>>,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (settled_tx, settled_rx) = mpsc::channel(SETTLED_CHANNEL_CAPACITY);

        let coalescer = Self {
            quiet,
            ignore,
            table: Arc::new(Mutex::new(TimerTable::default())),
            settled_tx,
        };

        (coalescer, settled_rx)
    }

    /// Create a coalescer that ignores nothing.
    pub fn unfiltered(quiet: Duration) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (_tx, rx) = watch::channel(Arc::new(IgnorePolicy::empty()));
        Self::new(quiet, rx)
    }

    /// The configured quiet period.
    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Change the quiet period for windows opened from now on.
    pub fn set_quiet(&mut self, quiet: Duration) {
        self.quiet = quiet;
    }

    /// Record a raw event for a normalized path.
    ///
    /// Returns `false` when the path is ignored and nothing was scheduled.
    /// Must be called from within a tokio runtime.
    pub fn push(&self, path: impl Into<String>, kind: ChangeKind) -> bool {
        let path = path.into();
        if self.ignore.borrow().should_ignore(&path) {
            return false;
        }

        let mut table = lock(&self.table);
        table.next_generation += 1;
        let generation = table.next_generation;

        let timer = self.arm(path.clone(), generation);
        if let Some(previous) = table.entries.insert(
            path.clone(),
            Pending {
                kind,
                generation,
                timer,
            },
        ) {
            previous.timer.abort();
            trace!("Restarted quiet window for {path} ({} -> {kind})", previous.kind);
        } else {
            trace!("Opened quiet window for {path} ({kind})");
        }

        true
    }

    /// Number of paths still inside their quiet window.
    pub fn pending_len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    fn arm(&self, path: String, generation: u64) -> JoinHandle<()> {
        let quiet = self.quiet;
        let table = Arc::clone(&self.table);
        let ignore = self.ignore.clone();
        let settled_tx = self.settled_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;

            let kind = {
                let mut table = lock(&table);
                match table.entries.get(&path) {
                    Some(pending) if pending.generation == generation => {
                        table.entries.remove(&path).map(|pending| pending.kind)
                    }
                    _ => None,
                }
            };
            let Some(kind) = kind else {
                return;
            };

            // The policy may have been reloaded while the window was open.
            if ignore.borrow().should_ignore(&path) {
                debug!("Dropping settled change for newly ignored path {path}");
                return;
            }

            debug!("Change settled: {path} ({kind})");
            if settled_tx.send(ChangeEvent::new(path, kind)).await.is_err() {
                debug!("Settled-event receiver dropped");
            }
        })
    }
}

impl Drop for EventCoalescer {
    fn drop(&mut self) {
        for (_, pending) in lock(&self.table).entries.drain() {
            pending.timer.abort();
        }
    }
}

fn lock(table: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
