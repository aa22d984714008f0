//! Plugin system for extensible server functionality.
//!
//! Plugins are the unit of composition in Keystone. Logging, the resource
//! runtime, and whatever the embedding game server layers on top are all
//! delivered as plugins and wired together by the [`Server`].
//!
//! # Example
//!
//! ```
//! use keystone_system::plugin::{Plugin, PluginId};
//! use keystone_system::server::Server;
//!
//! struct LoggingPlugin;
//! impl Plugin for LoggingPlugin {
//!     fn build(&self, _server: &mut Server) {}
//! }
//!
//! struct MotdPlugin {
//!     message: String,
//! }
//!
//! struct Motd(String);
//!
//! impl Plugin for MotdPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_global(Motd(self.message.clone()));
//!     }
//!
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<LoggingPlugin>()]
//!     }
//! }
//!
//! let mut server = Server::new();
//! server
//!     .add_plugins(LoggingPlugin)
//!     .add_plugins(MotdPlugin { message: "welcome".into() });
//! server.run();
//! ```

use core::any::TypeId;

use crate::server::Server;

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Based on [`TypeId`], so each plugin type has exactly one `PluginId`. The
/// type name is kept alongside for dependency resolution and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: Plugin>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of server functionality.
///
/// The server drives every plugin through a fixed lifecycle:
///
/// 1. **Build** - `build()` in dependency order
/// 2. **Ready** - `ready()` in dependency order, once every plugin is built
/// 3. **Cleanup** - `cleanup()` in reverse dependency order at shutdown
///
/// # Example
///
/// ```ignore
/// pub struct ResourcesPlugin {
///     config: RuntimeConfig,
/// }
///
/// impl Plugin for ResourcesPlugin {
///     fn build(&self, server: &mut Server) {
///         server.insert_global(self.config.clone());
///         server.insert_api(ResourceRuntime::new(self.config.clone(), host()));
///     }
///
///     fn cleanup(&self, server: &mut Server) {
///         if let Some(runtime) = server.api::<ResourceRuntime>() {
///             runtime.teardown();
///         }
///     }
///
///     fn dependencies(&self) -> Vec<PluginId> {
///         vec![PluginId::of::<TracingPlugin>()]
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Configures the server. Called once, in dependency order.
    ///
    /// Register state and APIs here. Plugins added from inside `build()` are
    /// built immediately.
    fn build(&self, server: &mut Server);

    /// Called after every plugin has been built.
    ///
    /// Use this for validation and for wiring that needs other plugins'
    /// state to exist.
    fn ready(&self, _server: &mut Server) {}

    /// Called when the server shuts down, in **reverse** dependency order.
    fn cleanup(&self, _server: &mut Server) {}

    /// Returns the plugin's name for debugging and error messages.
    ///
    /// Defaults to the type name. Dependency resolution matches on this
    /// value, so overriding it on a plugin others depend on breaks lookups.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Declares plugins that must be built before this one.
    fn dependencies(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Returns true if this plugin can only be added once.
    ///
    /// Default is `true`; adding a unique plugin twice panics.
    fn is_unique(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait (for add_plugins polymorphism)
// ─────────────────────────────────────────────────────────────────────────────

/// Types that can be handed to [`Server::add_plugins`].
///
/// Implemented for every [`Plugin`] and for [`PluginGroupBuilder`].
pub trait Plugins {
    /// Adds these plugins to the server.
    fn add_to_server(self, server: &mut Server);
}

impl<P: Plugin> Plugins for P {
    fn add_to_server(self, server: &mut Server) {
        // The id has to be captured before the concrete type is erased.
        let id = PluginId::of::<P>();
        server.add_plugin_boxed(id, Box::new(self));
    }
}

impl Plugins for PluginGroupBuilder {
    fn add_to_server(self, server: &mut Server) {
        for boxed in self.plugins {
            server.add_plugin_boxed(boxed.id, boxed.plugin);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Groups
// ─────────────────────────────────────────────────────────────────────────────

/// A bundle of plugins that are usually added together.
///
/// ```ignore
/// pub struct DefaultPlugins;
///
/// impl PluginGroup for DefaultPlugins {
///     fn build(self) -> PluginGroupBuilder {
///         PluginGroupBuilder::new()
///             .add(ServerInfoPlugin)
///             .add(TracingPlugin::default())
///     }
/// }
///
/// server.add_plugins(DefaultPlugins.build().disable::<TracingPlugin>());
/// ```
pub trait PluginGroup {
    /// Returns the plugins in this group.
    fn build(self) -> PluginGroupBuilder;
}

/// A boxed plugin together with the id captured before boxing.
pub(crate) struct BoxedPlugin {
    pub(crate) id: PluginId,
    pub(crate) plugin: Box<dyn Plugin>,
}

/// Builder for customizing plugin groups.
#[derive(Default)]
pub struct PluginGroupBuilder {
    pub(crate) plugins: Vec<BoxedPlugin>,
}

impl PluginGroupBuilder {
    /// Creates a new empty plugin group builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Adds a plugin to the end of the group.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins.push(BoxedPlugin {
            id: PluginId::of::<P>(),
            plugin: Box::new(plugin),
        });
        self
    }

    /// Removes a plugin from the group by type. No-op if absent.
    #[must_use]
    pub fn disable<P: Plugin>(mut self) -> Self {
        let target = PluginId::of::<P>();
        self.plugins.retain(|p| p.id != target);
        self
    }

    /// Returns the number of plugins in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the group contains no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
