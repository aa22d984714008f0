//! The resource runtime.
//!
//! [`ResourceRuntime`] is the single process-wide owner of the registry, the
//! dependency graph, the live script contexts and the lifecycle observers.
//! It is published as a server API by
//! [`ResourcesPlugin`](crate::plugin::ResourcesPlugin) and is cheap to clone;
//! clones share the same state.
//!
//! # Concurrency
//!
//! Every mutating operation (registration, lifecycle transitions, shutdown)
//! holds one async writer lock for its whole duration, so host callbacks of
//! different operations never interleave. Reads take a short synchronous
//! read lock and return copies; they never wait for a lifecycle operation.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use keystone_system::api::API;
use parking_lot::RwLock;

use crate::config::RuntimeConfig;
use crate::context::{ContextId, ContextInner, ScriptContext};
use crate::error::{ObserverError, ResourceError};
use crate::events::{LifecycleEvent, Observers};
use crate::host::ResourceHost;
use crate::identity::EntityId;
use crate::manifest::ResourceManifest;
use crate::registry::{Registry, ResourceId};
use crate::state::ResourceState;

pub(crate) struct Shared {
    pub(crate) config: RuntimeConfig,
    pub(crate) host: Arc<dyn ResourceHost>,
    pub(crate) registry: RwLock<Registry>,
    /// Serializes every mutating operation.
    pub(crate) writer: tokio::sync::Mutex<()>,
    contexts: RwLock<HashMap<ContextId, Weak<ContextInner>>>,
    next_context: AtomicU64,
    observers: Observers,
}

/// Registry, lifecycle controller and script query façade in one handle.
#[derive(Clone)]
pub struct ResourceRuntime {
    pub(crate) shared: Arc<Shared>,
}

impl API for ResourceRuntime {}

impl ResourceRuntime {
    /// Creates a runtime driving `host`.
    pub fn new(config: RuntimeConfig, host: impl ResourceHost) -> Self {
        Self::with_host(config, Arc::new(host))
    }

    /// Creates a runtime driving a shared host.
    pub fn with_host(config: RuntimeConfig, host: Arc<dyn ResourceHost>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                host,
                registry: RwLock::new(Registry::new()),
                writer: tokio::sync::Mutex::new(()),
                contexts: RwLock::new(HashMap::new()),
                next_context: AtomicU64::new(1),
                observers: Observers::default(),
            }),
        }
    }

    /// Returns the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a resource in the `Stopped` state.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::InvalidManifest`] if the manifest is malformed.
    /// - [`ResourceError::DuplicateName`] if the name is taken.
    /// - [`ResourceError::CyclicDependency`] if the new edges close a cycle.
    ///
    /// Nothing is registered on error.
    pub async fn register(&self, manifest: ResourceManifest) -> Result<ResourceId, ResourceError> {
        let _writer = self.shared.writer.lock().await;
        let name = manifest.name.clone();
        let id = self.shared.registry.write().register(manifest)?;
        tracing::info!(resource = %name, %id, "resource registered");
        Ok(id)
    }

    /// Registers a batch of resources atomically.
    ///
    /// Manifests may depend on each other in any order. Either all of them are
    /// registered or, on the first error, none is.
    pub async fn register_all(
        &self,
        manifests: Vec<ResourceManifest>,
    ) -> Result<Vec<ResourceId>, ResourceError> {
        let _writer = self.shared.writer.lock().await;
        self.register_all_now(manifests)
    }

    /// Batch registration for callers that know no lifecycle operation can be
    /// running, such as plugin build.
    pub(crate) fn register_all_now(
        &self,
        manifests: Vec<ResourceManifest>,
    ) -> Result<Vec<ResourceId>, ResourceError> {
        let count = manifests.len();
        let ids = self.shared.registry.write().register_all(manifests)?;
        tracing::info!(count, "resources registered");
        Ok(ids)
    }

    /// Removes a stopped resource that nothing depends on.
    ///
    /// Proxies standing for the resource are detached in every context.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if no such resource is registered.
    /// - [`ResourceError::InvalidState`] unless it is `Stopped` or `Error`.
    /// - [`ResourceError::HasDependants`] if a registered resource depends on it.
    pub async fn unregister(&self, name: &str) -> Result<(), ResourceError> {
        let _writer = self.shared.writer.lock().await;
        let removed = self.shared.registry.write().unregister(name)?;

        let mut entities = self.shared.host.native_entities(&removed);
        entities.push(EntityId::resource(removed.id()));
        self.invalidate(&entities);

        tracing::info!(resource = %name, id = %removed.id(), "resource unregistered");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Graph queries
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the registered resources that directly depend on `name`.
    #[must_use]
    pub fn dependants(&self, name: &str) -> Vec<String> {
        self.shared.registry.read().graph().dependants(name).to_vec()
    }

    /// Returns every resource that transitively depends on `name`, deepest first.
    pub fn transitive_dependants(&self, name: &str) -> Result<Vec<String>, ResourceError> {
        let registry = self.shared.registry.read();
        if !registry.exists(name) {
            return Err(ResourceError::NotFound(name.to_string()));
        }
        registry.graph().transitive_dependants(name)
    }

    /// Returns `name` and all of its transitive dependencies, dependencies first.
    pub fn start_order(&self, name: &str) -> Result<Vec<String>, ResourceError> {
        self.shared.registry.read().graph().start_order(name)
    }

    /// Returns the current state of a resource.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<ResourceState> {
        self.shared.registry.read().state(name)
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Returns true if no resource is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a named observer for every lifecycle state change.
    ///
    /// # Errors
    ///
    /// [`ObserverError::DuplicateName`] if the name is already taken.
    pub fn register_observer<F>(&self, name: impl Into<String>, observer: F) -> Result<&Self, ObserverError>
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.shared.observers.register(name.into(), observer)?;
        Ok(self)
    }

    /// Removes a named observer. Returns false if it was not registered.
    pub fn unregister_observer(&self, name: &str) -> bool {
        self.shared.observers.unregister(name)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Contexts
    // ─────────────────────────────────────────────────────────────────────

    /// Creates a script context, optionally backed by a resource.
    ///
    /// The runtime keeps only a weak reference; the context lives as long as
    /// the returned handle (or a clone of it).
    pub fn create_context(&self, resource: Option<&str>) -> ScriptContext {
        let id = ContextId::new(self.shared.next_context.fetch_add(1, Ordering::Relaxed));
        let context = ScriptContext::new(id, resource.map(str::to_string));

        let mut contexts = self.shared.contexts.write();
        contexts.retain(|_, weak| weak.strong_count() > 0);
        contexts.insert(id, context.downgrade());
        drop(contexts);

        tracing::debug!(context = %id, resource = ?resource, "script context created");
        context
    }

    /// Returns the number of live script contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.shared
            .contexts
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Tears down every live context, detaching all of their proxies.
    ///
    /// Resources are left in whatever state they are in; see
    /// [`shutdown`](Self::shutdown) for the full stop-then-teardown sequence.
    pub fn teardown(&self) {
        let contexts: Vec<Weak<ContextInner>> = self.shared.contexts.write().drain().map(|(_, weak)| weak).collect();
        let mut torn_down = 0;
        for context in contexts.iter().filter_map(Weak::upgrade) {
            if ScriptContext::teardown_inner(&context) {
                torn_down += 1;
            }
        }
        tracing::debug!(contexts = torn_down, "script contexts torn down");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals shared with the lifecycle controller
    // ─────────────────────────────────────────────────────────────────────

    /// Applies a validated state change, then logs and publishes it.
    pub(crate) fn transition(&self, name: &str, next: ResourceState) -> Result<ResourceState, ResourceError> {
        let (previous, id) = {
            let mut registry = self.shared.registry.write();
            let previous = registry.set_state(name, next)?;
            let id = registry
                .id_of(name)
                .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
            (previous, id)
        };

        tracing::info!(resource = %name, from = %previous, to = %next, "resource state changed");
        self.shared.observers.emit(&LifecycleEvent {
            resource: name.to_string(),
            id,
            from: previous,
            to: next,
        });
        Ok(previous)
    }

    /// Native entities the host reports for `name` right now.
    pub(crate) fn owned_entities(&self, name: &str) -> Vec<EntityId> {
        let Some(resource) = self.shared.registry.read().get(name) else {
            return Vec::new();
        };
        self.shared.host.native_entities(&resource)
    }

    /// Invalidates `held` plus whatever the host reports for `name` now.
    ///
    /// `held` is the snapshot taken before the transition began; a host that
    /// has already released its entities reports nothing afterwards.
    pub(crate) fn invalidate_owned(&self, name: &str, mut held: Vec<EntityId>) {
        for entity in self.owned_entities(name) {
            if !held.contains(&entity) {
                held.push(entity);
            }
        }
        self.invalidate(&held);
    }

    fn invalidate(&self, entities: &[EntityId]) {
        if entities.is_empty() {
            return;
        }

        let contexts: Vec<Arc<ContextInner>> = self
            .shared
            .contexts
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        let mut detached = 0_usize;
        for context in &contexts {
            for entity in entities {
                if context.cache().invalidate(*entity) {
                    detached += 1;
                }
            }
        }
        tracing::debug!(entities = entities.len(), detached, "native entities invalidated");
    }
}

impl fmt::Debug for ResourceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRuntime")
            .field("config", &self.shared.config)
            .field("resources", &self.len())
            .field("contexts", &self.context_count())
            .finish_non_exhaustive()
    }
}
