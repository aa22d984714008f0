//! Read-only queries and the script-facing resource objects.
//!
//! Snapshot queries ([`get`](ResourceRuntime::get), [`all`](ResourceRuntime::all),
//! [`exists`](ResourceRuntime::exists)) need no context. Object queries go
//! through a [`ScriptContext`] and return [`ResourceObject`]s backed by that
//! context's identity cache, so asking twice for the same resource yields the
//! same proxy.

use std::path::PathBuf;

use crate::context::ScriptContext;
use crate::error::ResourceError;
use crate::host::Exports;
use crate::identity::{EntityId, Proxy};
use crate::registry::{Resource, ResourceId};
use crate::runtime::ResourceRuntime;
use crate::state::ResourceState;

/// Payload stored in the proxy of a resource object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    /// Registration id the proxy was created for.
    pub id: ResourceId,
    /// Name of the resource.
    pub name: String,
}

impl ResourceRuntime {
    /// Returns a snapshot of a resource, or `None` if it is not registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Resource> {
        self.shared.registry.read().get(name)
    }

    /// Returns true if a resource with this name is registered.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.shared.registry.read().exists(name)
    }

    /// Returns snapshots of every registered resource, in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<Resource> {
        self.shared.registry.read().all()
    }

    /// Returns the object of the resource backing `context`, if any.
    #[must_use]
    pub fn current(&self, context: &ScriptContext) -> Option<ResourceObject> {
        let name = context.resource()?;
        self.by_name(context, name)
    }

    /// Returns an object per registered resource, in registration order.
    ///
    /// A torn-down context gets no objects.
    #[must_use]
    pub fn all_objects(&self, context: &ScriptContext) -> Vec<ResourceObject> {
        if context.is_torn_down() {
            return Vec::new();
        }
        self.all()
            .iter()
            .map(|resource| self.object_for(context, resource))
            .collect()
    }

    /// Returns the object of a named resource, creating its proxy on first use.
    #[must_use]
    pub fn by_name(&self, context: &ScriptContext, name: &str) -> Option<ResourceObject> {
        if context.is_torn_down() {
            return None;
        }
        let resource = self.get(name)?;
        Some(self.object_for(context, &resource))
    }

    /// Returns the object of a named resource only if the context already holds one.
    #[must_use]
    pub fn peek(&self, context: &ScriptContext, name: &str) -> Option<ResourceObject> {
        let id = self.shared.registry.read().id_of(name)?;
        let proxy = context.cache().lookup(EntityId::resource(id))?;
        Some(ResourceObject {
            proxy,
            runtime: self.clone(),
        })
    }

    fn object_for(&self, context: &ScriptContext, resource: &Resource) -> ResourceObject {
        let handle = ResourceHandle {
            id: resource.id(),
            name: resource.name().to_string(),
        };
        let proxy = context
            .cache()
            .get_or_create(EntityId::resource(resource.id()), move |_| handle);
        ResourceObject {
            proxy,
            runtime: self.clone(),
        }
    }
}

/// Script-visible resource object.
///
/// Attributes are read live from the registry on every access. Once the
/// resource is unregistered, or the owning context is torn down, every read
/// fails with [`ResourceError::StaleHandle`].
#[derive(Debug, Clone)]
pub struct ResourceObject {
    proxy: Proxy,
    runtime: ResourceRuntime,
}

impl ResourceObject {
    /// Returns the underlying proxy.
    #[must_use]
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Returns true if both objects share the same proxy.
    #[must_use]
    pub fn same_as(&self, other: &ResourceObject) -> bool {
        self.proxy.ptr_eq(&other.proxy)
    }

    /// Returns a fresh snapshot of the resource.
    pub fn snapshot(&self) -> Result<Resource, ResourceError> {
        let stale = || ResourceError::StaleHandle {
            entity: self.proxy.entity(),
        };
        let handle = self.proxy.payload::<ResourceHandle>()?.ok_or_else(stale)?;
        self.runtime
            .get(&handle.name)
            .filter(|resource| resource.id() == handle.id)
            .ok_or_else(stale)
    }

    /// Returns the registration id.
    pub fn id(&self) -> Result<ResourceId, ResourceError> {
        self.snapshot().map(|resource| resource.id())
    }

    /// Returns the resource name.
    pub fn name(&self) -> Result<String, ResourceError> {
        self.snapshot().map(|resource| resource.name().to_string())
    }

    /// Returns the resource directory.
    pub fn path(&self) -> Result<PathBuf, ResourceError> {
        self.snapshot().map(|resource| resource.path().to_path_buf())
    }

    /// Returns the entry point.
    pub fn main(&self) -> Result<String, ResourceError> {
        self.snapshot().map(|resource| resource.main().to_string())
    }

    /// Returns the script runtime tag.
    pub fn kind(&self) -> Result<String, ResourceError> {
        self.snapshot().map(|resource| resource.kind().to_string())
    }

    /// Returns the exports; empty unless the resource is running.
    pub fn exports(&self) -> Result<Exports, ResourceError> {
        self.snapshot().map(|resource| resource.exports().clone())
    }

    /// Returns the declared dependencies.
    pub fn dependencies(&self) -> Result<Vec<String>, ResourceError> {
        self.snapshot().map(|resource| resource.dependencies().to_vec())
    }

    /// Returns the registered dependants.
    pub fn dependants(&self) -> Result<Vec<String>, ResourceError> {
        self.snapshot().map(|resource| resource.dependants().to_vec())
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> Result<ResourceState, ResourceError> {
        self.snapshot().map(|resource| resource.state())
    }

    /// Returns true if the resource is running.
    pub fn is_started(&self) -> Result<bool, ResourceError> {
        self.snapshot().map(|resource| resource.is_started())
    }
}
