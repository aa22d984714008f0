//! Core infrastructure plugins for Keystone.
//!
//! - [`ServerInfoPlugin`] - Server identity and build metadata
//! - [`TracingPlugin`] - Logging via the `tracing` crate
//! - [`DefaultPlugins`] - Both of the above
//!
//! # Example
//!
//! ```no_run
//! use keystone_system::server::Server;
//! use keystone_system::plugin::PluginGroup;
//! use keystone_core::DefaultPlugins;
//!
//! Server::new()
//!     .add_plugins(DefaultPlugins.build())
//!     .run();
//! ```
//!
//! For fine-grained control, add plugins individually:
//!
//! ```
//! use keystone_system::server::Server;
//! use keystone_core::{ServerInfoPlugin, TracingPlugin};
//! use tracing::Level;
//!
//! Server::new()
//!     .add_plugins(ServerInfoPlugin::named("eu-west-1"))
//!     .add_plugins(TracingPlugin::default().with_level(Level::DEBUG))
//!     .run();
//! ```

mod server_info;
mod tracing_plugin;

pub use server_info::{ServerInfo, ServerInfoPlugin};
pub use tracing_plugin::{TracingConfig, TracingFormat, TracingPlugin};

use keystone_system::plugin::{PluginGroup, PluginGroupBuilder};

/// Default infrastructure plugins: [`ServerInfoPlugin`] and [`TracingPlugin`].
///
/// ```ignore
/// Server::new()
///     .add_plugins(DefaultPlugins.build().disable::<TracingPlugin>())
///     .run();
/// ```
pub struct DefaultPlugins;

impl PluginGroup for DefaultPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(ServerInfoPlugin::default())
            .add(TracingPlugin::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_system::server::Server;

    #[test]
    fn default_plugins_contains_both() {
        assert_eq!(DefaultPlugins.build().len(), 2);
    }

    #[test]
    fn server_without_tracing_still_has_info() {
        let mut server = Server::new();
        server.add_plugins(DefaultPlugins.build().disable::<TracingPlugin>());
        server.finish();

        assert!(server.contains_global::<ServerInfo>());
        assert!(!server.contains_global::<TracingConfig>());
    }
}
