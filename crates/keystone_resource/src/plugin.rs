//! Server integration.

use std::sync::Arc;

use keystone_system::plugin::Plugin;
use keystone_system::server::Server;

use crate::config::RuntimeConfig;
use crate::host::ResourceHost;
use crate::manifest::ResourceManifest;
use crate::runtime::ResourceRuntime;
use crate::state::ResourceState;

/// Installs the [`ResourceRuntime`] into a server.
///
/// # Lifecycle
///
/// - **`build()`** publishes [`RuntimeConfig`] as a global, creates the runtime,
///   registers the preloaded manifests and publishes the runtime as an API.
/// - **`ready()`** logs what was registered.
/// - **`cleanup()`** tears down every live script context. Resources should be
///   stopped beforehand with [`ResourceRuntime::shutdown`]; any still running
///   at this point are reported.
///
/// # Panics
///
/// `build()` panics if the preloaded manifests cannot be registered.
///
/// # Example
///
/// ```
/// use keystone_resource::prelude::*;
/// use keystone_system::server::Server;
///
/// let mut server = Server::new();
/// server.add_plugins(
///     ResourcesPlugin::new(NoopHost)
///         .with_manifest(ResourceManifest::new("core", "resources/core", "index.js"))
///         .with_manifest(
///             ResourceManifest::new("game", "resources/game", "index.js").depends_on("core"),
///         ),
/// );
/// server.finish();
///
/// let runtime = server.api::<ResourceRuntime>().unwrap();
/// assert_eq!(runtime.start_order("game").unwrap(), vec!["core", "game"]);
/// ```
pub struct ResourcesPlugin {
    config: RuntimeConfig,
    host: Arc<dyn ResourceHost>,
    manifests: Vec<ResourceManifest>,
}

impl ResourcesPlugin {
    /// Creates the plugin with the default configuration.
    pub fn new(host: impl ResourceHost) -> Self {
        Self::with_host(Arc::new(host))
    }

    /// Creates the plugin around a shared host.
    pub fn with_host(host: Arc<dyn ResourceHost>) -> Self {
        Self {
            config: RuntimeConfig::default(),
            host,
            manifests: Vec::new(),
        }
    }

    /// Sets the runtime configuration.
    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a manifest to register during build.
    #[must_use]
    pub fn with_manifest(mut self, manifest: ResourceManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Adds several manifests to register during build.
    #[must_use]
    pub fn with_manifests(mut self, manifests: impl IntoIterator<Item = ResourceManifest>) -> Self {
        self.manifests.extend(manifests);
        self
    }
}

impl Plugin for ResourcesPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_global(self.config.clone());

        let runtime = ResourceRuntime::with_host(self.config.clone(), Arc::clone(&self.host));
        if !self.manifests.is_empty()
            && let Err(err) = runtime.register_all_now(self.manifests.clone())
        {
            panic!("ResourcesPlugin: failed to register preloaded manifests: {err}");
        }

        server.insert_api(runtime);
    }

    fn ready(&self, server: &mut Server) {
        if let Some(runtime) = server.api::<ResourceRuntime>() {
            tracing::info!(
                resources = runtime.len(),
                timeout = ?runtime.config().transition_timeout(),
                "ResourcesPlugin initialized"
            );
        }
    }

    fn cleanup(&self, server: &mut Server) {
        let Some(runtime) = server.api::<ResourceRuntime>() else {
            return;
        };

        let running: Vec<String> = runtime
            .all()
            .into_iter()
            .filter(|resource| resource.state() != ResourceState::Stopped)
            .map(|resource| resource.name().to_string())
            .collect();
        if !running.is_empty() {
            tracing::warn!(?running, "ResourcesPlugin cleanup with resources not stopped");
        }

        runtime.teardown();
        tracing::info!("ResourcesPlugin shutting down");
    }
}
