//! # Keystone Internal Library
//!
//! Re-exports the core Keystone crates for convenience.

/// Layer 1: Server runtime and plugin orchestration.
pub use keystone_system;

/// Layer 1: Infrastructure plugins (server info, tracing).
pub use keystone_core;

/// Layer 2: Resource lifecycle and script object identity.
pub use keystone_resource;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use keystone_core::{DefaultPlugins, ServerInfo, ServerInfoPlugin, TracingPlugin};
    pub use keystone_resource::prelude::*;
    pub use keystone_system::prelude::*;
}
