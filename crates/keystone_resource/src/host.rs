//! The embedding's side of resource lifecycle.
//!
//! The runtime decides *when* a resource starts or stops; a [`ResourceHost`]
//! does the actual work (spinning up a script runtime, loading `main`,
//! tearing everything down) and tells the runtime which native entities a
//! resource owns so their proxies can be invalidated on transitions.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::HostError;
use crate::identity::EntityId;
use crate::registry::Resource;

/// Values a started resource publishes to other resources.
pub type Exports = Map<String, Value>;

/// Callbacks the runtime drives during lifecycle transitions.
///
/// `start` and `stop` run under the runtime's writer lock and are bounded by
/// [`RuntimeConfig::transition_timeout`](crate::config::RuntimeConfig::transition_timeout).
/// They receive a snapshot of the resource taken just before the call.
#[async_trait]
pub trait ResourceHost: Send + Sync + 'static {
    /// Native entities currently owned by `resource`.
    ///
    /// Queried before every transition out of a stable state and again once
    /// it settles; the union of both answers is invalidated. A host may
    /// therefore stop reporting entities as soon as it releases them.
    fn native_entities(&self, resource: &Resource) -> Vec<EntityId> {
        let _ = resource;
        Vec::new()
    }

    /// Starts the resource and returns its exports.
    async fn start(&self, resource: &Resource) -> Result<Exports, HostError>;

    /// Stops the resource.
    ///
    /// A failure is logged and reported, but the resource still ends up `Stopped`.
    async fn stop(&self, resource: &Resource) -> Result<(), HostError>;
}

/// Host that accepts every transition and exports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

#[async_trait]
impl ResourceHost for NoopHost {
    async fn start(&self, _resource: &Resource) -> Result<Exports, HostError> {
        Ok(Exports::new())
    }

    async fn stop(&self, _resource: &Resource) -> Result<(), HostError> {
        Ok(())
    }
}
