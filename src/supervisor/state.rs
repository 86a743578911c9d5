//! Link state and client-visible status.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    /// No worker and nothing scheduled.
    #[default]
    Disconnected,
    /// Worker running with at least one client.
    Connected,
    /// Worker running, no clients left, teardown timer armed.
    TeardownPending,
    /// Intentional shutdown in progress; the exit will not trigger a reconnect.
    Stopping,
    /// No worker; a reconnect attempt is queued.
    ReconnectPending,
}

impl LinkState {
    /// Whether a worker process currently exists.
    #[must_use]
    pub fn has_process(self) -> bool {
        matches!(self, Self::Connected | Self::TeardownPending | Self::Stopping)
    }

    /// The status reported to clients in this state.
    #[must_use]
    pub fn status(self) -> LinkStatus {
        match self {
            Self::Connected | Self::TeardownPending => LinkStatus::Connected,
            Self::Disconnected | Self::Stopping | Self::ReconnectPending => {
                LinkStatus::Disconnected
            }
        }
    }
}

/// Connection status as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    /// Display hint for a status indicator.
    #[must_use]
    pub fn indicator(self) -> StatusIndicator {
        match self {
            Self::Connected => StatusIndicator {
                fill: Fill::Green,
                shape: Shape::Dot,
                text: "Connected",
            },
            Self::Disconnected => StatusIndicator {
                fill: Fill::Red,
                shape: Shape::Ring,
                text: "Disconnected",
            },
        }
    }

    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Indicator colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    Green,
    Red,
}

/// Indicator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Dot,
    Ring,
}

/// How a host should render a client's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusIndicator {
    pub fill: Fill,
    pub shape: Shape,
    pub text: &'static str,
}

/// Counters for worker lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Workers started successfully.
    pub spawns: usize,
    /// Launch attempts that failed.
    pub spawn_failures: usize,
    /// Exits not caused by an intentional shutdown.
    pub unexpected_exits: usize,
    /// Fatal lines or diagnostic output that forced a kill.
    pub device_faults: usize,
    /// Idle teardowns performed.
    pub teardowns: usize,
}

impl LinkStats {
    pub(crate) fn record_spawn(&mut self) {
        self.spawns = self.spawns.saturating_add(1);
    }

    pub(crate) fn record_spawn_failure(&mut self) {
        self.spawn_failures = self.spawn_failures.saturating_add(1);
    }

    pub(crate) fn record_unexpected_exit(&mut self) {
        self.unexpected_exits = self.unexpected_exits.saturating_add(1);
    }

    pub(crate) fn record_device_fault(&mut self) {
        self.device_faults = self.device_faults.saturating_add(1);
    }

    pub(crate) fn record_teardown(&mut self) {
        self.teardowns = self.teardowns.saturating_add(1);
    }
}
