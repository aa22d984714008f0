//! Server information plugin.
//!
//! Provides [`ServerInfoPlugin`], which publishes [`ServerInfo`] as global
//! state so plugins and script bindings can report what they are running in.

use keystone_system::plugin::Plugin;
use keystone_system::server::Server;

/// Identity and build metadata of the running server.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Instance name reported to operators (e.g. a region or shard id).
    pub name: String,
    /// Framework version string.
    pub version: &'static str,
    /// Whether the server was compiled with debug assertions.
    pub debug: bool,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "keystone".to_string(),
            version: env!("CARGO_PKG_VERSION"),
            debug: cfg!(debug_assertions),
        }
    }
}

/// Plugin that registers [`ServerInfo`] as global state.
///
/// Foundational: it has no dependencies and [`TracingPlugin`](crate::TracingPlugin)
/// depends on it.
#[derive(Debug, Default, Clone)]
pub struct ServerInfoPlugin {
    name: Option<String>,
}

impl ServerInfoPlugin {
    /// Creates the plugin with an explicit instance name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl Plugin for ServerInfoPlugin {
    fn build(&self, server: &mut Server) {
        let mut info = ServerInfo::default();
        if let Some(name) = &self.name {
            info.name.clone_from(name);
        }
        server.insert_global(info);
    }
}
