//! The monitor's activity state machine.
//!
//! ```text
//!            accepted change
//!   Idle ───────────────────────► Active ──┐ more changes
//!    ▲                              │   ◄──┘
//!    └──── last pipeline done ──────┘
//!
//!   any state ── watcher fault ──► Error   (terminal)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Coarse activity of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Idle,
    Active,
    Error,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide monitor state, owned and mutated by the orchestrator alone.
#[derive(Debug, Clone)]
pub struct MonitorState {
    activity: Activity,

    /// Pipelines started and not yet finished.
    in_flight: usize,

    /// Whether the current idle period has been reported.
    idle_reported: bool,

    last_activity: Option<DateTime<Utc>>,

    fault: Option<String>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            activity: Activity::Idle,
            in_flight: 0,
            idle_reported: false,
            last_activity: None,
            fault: None,
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// The fault that ended the session, if any.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// An accepted change starts a pipeline.
    ///
    /// Returns `false` once the session has faulted; no pipeline may start.
    pub fn begin(&mut self) -> bool {
        if self.activity == Activity::Error {
            return false;
        }
        self.in_flight += 1;
        self.last_activity = Some(Utc::now());
        self.activity = Activity::Active;
        self.idle_reported = false;
        true
    }

    /// A pipeline finished, successfully or not.
    ///
    /// Returns `true` when this was the last one in flight and the monitor
    /// went back to idle.
    pub fn complete(&mut self) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.activity == Activity::Active && self.in_flight == 0 {
            self.activity = Activity::Idle;
            return true;
        }
        false
    }

    /// The watch subscription failed. Terminal for this session.
    pub fn set_fault(&mut self, reason: impl Into<String>) {
        self.activity = Activity::Error;
        self.fault = Some(reason.into());
    }

    /// Idle-report timer tick. Returns `true` only on the first tick of each
    /// idle period.
    pub fn on_tick(&mut self) -> bool {
        if self.activity == Activity::Idle && !self.idle_reported {
            self.idle_reported = true;
            return true;
        }
        false
    }
}
