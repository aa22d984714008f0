//! Tracing and logging plugin.
//!
//! [`TracingPlugin`] installs the `tracing` subscriber for the whole process
//! and publishes [`TracingConfig`] as global state.
//!
//! # Lifecycle
//!
//! - **`build()`** publishes [`TracingConfig`] so other plugins can read the
//!   intended level while they build.
//! - **`ready()`** installs the subscriber. Installation is skipped silently
//!   if the embedding already installed one.
//!
//! # Example
//!
//! ```
//! use keystone_system::server::Server;
//! use keystone_core::{ServerInfoPlugin, TracingPlugin, TracingFormat};
//! use tracing::Level;
//!
//! let mut server = Server::new();
//! server.add_plugins(ServerInfoPlugin::default());
//! server.add_plugins(
//!     TracingPlugin::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact)
//!         .with_env_filter("keystone_resource=debug,keystone_system=info"),
//! );
//! server.finish();
//! ```

use crate::ServerInfoPlugin;
use keystone_system::plugin::{Plugin, PluginId};
use keystone_system::server::Server;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable multi-line output (default).
    #[default]
    Pretty,
    /// Single-line output, suited to a server console.
    Compact,
    /// JSON lines for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Global state describing the installed logging configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    /// The configured maximum log level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Logging plugin backed by [`tracing_subscriber`].
///
/// # Dependencies
///
/// - [`ServerInfoPlugin`]
#[derive(Clone)]
pub struct TracingPlugin {
    level: Level,
    format: TracingFormat,
    /// Target directives such as `"keystone_resource=debug,keystone_system=warn"`.
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingPlugin {
    /// Creates a `TracingPlugin` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets target-specific directives, overriding the plain level.
    ///
    /// Invalid directives fall back to the configured level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        self.env_filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.as_str()))
    }
}

impl Plugin for TracingPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_global(TracingConfig {
            level: self.level,
            format: self.format,
        });
    }

    fn ready(&self, _server: &mut Server) {
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        let fmt_layer = tracing_subscriber::fmt::layer();
        let fmt_layer = match self.format {
            TracingFormat::Pretty => fmt_layer.pretty().with_span_events(span_events).boxed(),
            TracingFormat::Compact => fmt_layer.compact().with_span_events(span_events).boxed(),
            TracingFormat::Json => fmt_layer.json().with_span_events(span_events).boxed(),
        };

        // An embedding (or a test harness) may already own the global subscriber.
        let installed = tracing_subscriber::registry()
            .with(self.env_filter())
            .with(fmt_layer)
            .try_init()
            .is_ok();

        tracing::info!(
            level = %self.level,
            format = ?self.format,
            installed,
            "TracingPlugin initialized"
        );
    }

    fn cleanup(&self, _server: &mut Server) {
        tracing::info!("TracingPlugin shutting down");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<ServerInfoPlugin>()]
    }
}
