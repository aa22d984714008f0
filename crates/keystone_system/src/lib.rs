//! The server runtime for Keystone (Layer 1).
//!
//! `keystone_system` hosts everything else in the workspace. A game server
//! embedding Keystone creates a [`Server`](server::Server), adds plugins, and
//! lets the server build them in dependency order:
//!
//! - [`api`] - API trait for capabilities shared between plugins
//! - [`plugin`] - Plugin trait, plugin identity and plugin groups
//! - [`state`] - Typed state storage with RAII borrow guards
//! - [`server`] - Server runtime for plugin orchestration
//!
//! # Architecture
//!
//! - **Layer 1** (`keystone_system`, `keystone_core`): server runtime and
//!   infrastructure plugins (this crate)
//! - **Layer 2** (`keystone_resource`): resource lifecycle and script object
//!   identity
//!
//! # Example
//!
//! ```
//! use keystone_system::plugin::Plugin;
//! use keystone_system::server::Server;
//!
//! #[derive(Default)]
//! struct TickRate { hz: u32 }
//!
//! struct TickPlugin;
//!
//! impl Plugin for TickPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_global(TickRate { hz: 30 });
//!     }
//! }
//!
//! let mut server = Server::new();
//! server.add_plugins(TickPlugin);
//! server.run();
//! assert_eq!(server.get_global::<TickRate>().unwrap().hz, 30);
//! ```

/// API trait for plugin-to-plugin capabilities.
pub mod api;

/// Plugin trait for extensible functionality.
pub mod plugin;

/// Server runtime for plugin orchestration.
pub mod server;

/// Typed state storage.
pub mod state;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::api::*;
    pub use crate::plugin::*;
    pub use crate::server::*;
    pub use crate::state::*;
}
