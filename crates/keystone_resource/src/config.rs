//! Runtime configuration.

use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of the resource runtime.
///
/// Published as a global by [`ResourcesPlugin`](crate::plugin::ResourcesPlugin)
/// so other plugins can read it while they build.
///
/// ```
/// use core::time::Duration;
/// use keystone_resource::config::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "transition_timeout_ms": 500 }"#).unwrap();
/// assert_eq!(config.transition_timeout(), Duration::from_millis(500));
/// assert!(config.stop_on_shutdown);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound for a single host start or stop callback, in milliseconds.
    pub transition_timeout_ms: u64,
    /// Whether `shutdown` stops every started resource before tearing down contexts.
    pub stop_on_shutdown: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            transition_timeout_ms: 30_000,
            stop_on_shutdown: true,
        }
    }
}

impl RuntimeConfig {
    /// Returns the host callback timeout.
    #[must_use]
    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }

    /// Sets the host callback timeout.
    #[must_use]
    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets whether cleanup stops running resources.
    #[must_use]
    pub fn with_stop_on_shutdown(mut self, enabled: bool) -> Self {
        self.stop_on_shutdown = enabled;
        self
    }

    /// Parses a configuration document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
