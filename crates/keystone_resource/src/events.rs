//! Lifecycle events and their observers.
//!
//! Every state change the runtime performs is published, in order, to the
//! registered observers. Observers run synchronously on the task performing
//! the transition, after the new state is visible through queries.
//!
//! ```
//! # use keystone_resource::prelude::*;
//! let runtime = ResourceRuntime::new(RuntimeConfig::default(), NoopHost);
//! runtime
//!     .register_observer("audit", |event: &LifecycleEvent| {
//!         tracing::info!(resource = %event.resource, to = %event.to, "transition");
//!     })
//!     .unwrap();
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::ObserverError;
use crate::registry::ResourceId;
use crate::state::ResourceState;

/// A single resource state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Name of the resource.
    pub resource: String,
    /// Registration id of the resource.
    pub id: ResourceId,
    /// State before the change.
    pub from: ResourceState,
    /// State after the change.
    pub to: ResourceState,
}

type Observer = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Named observers, invoked in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    entries: RwLock<IndexMap<String, Observer>>,
}

impl Observers {
    pub(crate) fn register(
        &self,
        name: String,
        observer: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> Result<(), ObserverError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(ObserverError::DuplicateName(name));
        }
        entries.insert(name, Arc::new(observer));
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) -> bool {
        self.entries.write().shift_remove(name).is_some()
    }

    /// Calls every observer outside the lock, so observers may query the runtime.
    pub(crate) fn emit(&self, event: &LifecycleEvent) {
        let observers: Vec<Observer> = self.entries.read().values().cloned().collect();
        for observer in observers {
            observer(event);
        }
    }
}
