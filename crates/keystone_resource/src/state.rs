//! Resource lifecycle states.

use core::fmt;

use serde::Serialize;

/// Lifecycle state of a registered resource.
///
/// ```text
/// Stopped ──► Starting ──► Started ──► Stopping ──► Stopped
///                │            │            │
///                └────────────┴────────────┴──► Error ──(reset)──► Stopped
/// ```
///
/// `Starting` and `Stopping` are always traversed, so there is never a direct
/// edge between `Stopped` and `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Registered but not running.
    #[default]
    Stopped,
    /// The host's start callback is running.
    Starting,
    /// Running.
    Started,
    /// The host's stop callback is running.
    Stopping,
    /// Failed; only `reset` or unregistration leave this state.
    Error,
}

impl ResourceState {
    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: ResourceState) -> bool {
        use ResourceState::{Error, Started, Starting, Stopped, Stopping};
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Started | Error)
                | (Started, Stopping | Error)
                | (Stopping, Stopped | Error)
                | (Error, Stopped)
        )
    }

    /// Returns true while a start or stop callback is running.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, ResourceState::Starting | ResourceState::Stopping)
    }

    /// Returns true for states that keep dependencies pinned (`Starting`, `Started`).
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, ResourceState::Starting | ResourceState::Started)
    }

    /// Returns the lowercase name used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Stopped => "stopped",
            ResourceState::Starting => "starting",
            ResourceState::Started => "started",
            ResourceState::Stopping => "stopping",
            ResourceState::Error => "error",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
