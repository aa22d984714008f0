//! Resource lifecycle and script object identity for Keystone (Layer 2).
//!
//! A *resource* is a named bundle of scripts with a manifest, a lifecycle and
//! declared dependencies on other resources. This crate owns:
//!
//! - [`registry`] - registered resources and their snapshots
//! - [`graph`] - dependency ordering and dependant lookups
//! - [`controller`] - start, stop and restart with rollback and cascades
//! - [`identity`] - native entity ids, proxies and the per-context identity cache
//! - [`context`] - script contexts owning an identity cache
//! - [`query`] - the script-facing query façade and resource objects
//! - [`plugin`] - [`ResourcesPlugin`](plugin::ResourcesPlugin), the server integration
//!
//! The embedding supplies a [`ResourceHost`](host::ResourceHost) that actually
//! runs scripts; the runtime decides when.
//!
//! # Example
//!
//! ```
//! use keystone_resource::prelude::*;
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let runtime = ResourceRuntime::new(RuntimeConfig::default(), NoopHost);
//! runtime
//!     .register_all(vec![
//!         ResourceManifest::new("game", "resources/game", "index.js").depends_on("auth"),
//!         ResourceManifest::new("auth", "resources/auth", "index.js").depends_on("core"),
//!         ResourceManifest::new("core", "resources/core", "index.js"),
//!     ])
//!     .await
//!     .unwrap();
//!
//! let started = runtime.start("game").await.unwrap();
//! assert_eq!(started, vec!["core", "auth", "game"]);
//!
//! let context = runtime.create_context(Some("game"));
//! let me = runtime.current(&context).unwrap();
//! assert!(me.is_started().unwrap());
//! assert_eq!(me.dependencies().unwrap(), vec!["auth"]);
//! # }
//! ```

/// Runtime configuration.
pub mod config;

/// Script contexts.
pub mod context;

/// Lifecycle controller.
pub mod controller;

/// Error types.
pub mod error;

/// Lifecycle events.
pub mod events;

/// Dependency graph.
pub mod graph;

/// Host callbacks.
pub mod host;

/// Entity identity and proxy caching.
pub mod identity;

/// Resource manifests.
pub mod manifest;

/// Server plugin.
pub mod plugin;

/// Query façade.
pub mod query;

/// Resource registry.
pub mod registry;

/// Resource runtime.
pub mod runtime;

/// Lifecycle states.
pub mod state;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::context::{ContextId, ScriptContext};
    pub use crate::error::{HostError, ObserverError, ResourceError};
    pub use crate::events::LifecycleEvent;
    pub use crate::graph::DependencyGraph;
    pub use crate::host::{Exports, NoopHost, ResourceHost};
    pub use crate::identity::{EntityId, EntityKind, IdentityCache, Proxy, ProxyFactories};
    pub use crate::manifest::ResourceManifest;
    pub use crate::plugin::ResourcesPlugin;
    pub use crate::query::{ResourceHandle, ResourceObject};
    pub use crate::registry::{Resource, ResourceId};
    pub use crate::runtime::ResourceRuntime;
    pub use crate::state::ResourceState;
}
