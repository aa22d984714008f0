//! Error types for resource registration, lifecycle and proxy access.

use core::time::Duration;

use crate::identity::{EntityId, EntityKind};
use crate::state::ResourceState;

/// Errors returned by the resource runtime.
///
/// Registration and lookup errors are returned as-is and never retried.
/// Errors raised inside a start cascade are wrapped once in
/// [`DependencyStartFailed`](Self::DependencyStartFailed) naming the first
/// dependency that failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// No resource with this name is registered.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// A resource with this name is already registered.
    #[error("resource '{0}' is already registered")]
    DuplicateName(String),

    /// The manifest is malformed.
    #[error("invalid manifest for '{resource}': {reason}")]
    InvalidManifest {
        /// Name of the resource the manifest describes.
        resource: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The dependency relation has no valid topological order.
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// The resources forming the cycle, first element repeated at the end.
        cycle: Vec<String>,
    },

    /// The resource cannot be unregistered while others depend on it.
    #[error("resource '{resource}' is required by {}", .dependants.join(", "))]
    HasDependants {
        /// The resource that was to be unregistered.
        resource: String,
        /// Registered resources declaring a dependency on it.
        dependants: Vec<String>,
    },

    /// The resource cannot be stopped without cascading.
    #[error("resource '{resource}' is required by running {}", .dependants.join(", "))]
    HasActiveDependants {
        /// The resource that was to be stopped.
        resource: String,
        /// Running resources that depend on it, deepest first.
        dependants: Vec<String>,
    },

    /// A dependency failed while starting a resource; the start was rolled back.
    #[error("dependency '{dependency}' failed to start: {source}")]
    DependencyStartFailed {
        /// The first dependency that failed.
        dependency: String,
        /// Why it failed.
        #[source]
        source: Box<ResourceError>,
    },

    /// The resource is in the middle of a transition in the other direction.
    #[error("resource '{resource}' is already {state}")]
    AlreadyInProgress {
        /// The resource that was targeted.
        resource: String,
        /// The in-flight state it was observed in.
        state: ResourceState,
    },

    /// A host callback did not finish in time; the resource was forced to `Error`.
    #[error("resource '{resource}' timed out after {timeout:?} while {state}")]
    Timeout {
        /// The resource whose callback hung.
        resource: String,
        /// The transition that timed out (`Starting` or `Stopping`).
        state: ResourceState,
        /// The configured limit.
        timeout: Duration,
    },

    /// The proxy's native entity was invalidated; re-query to get a fresh one.
    #[error("stale handle: {entity} is no longer valid")]
    StaleHandle {
        /// The entity the proxy was bound to.
        entity: EntityId,
    },

    /// The operation is not valid from the resource's current state.
    #[error("cannot {operation} resource '{resource}' while {state}")]
    InvalidState {
        /// The resource that was targeted.
        resource: String,
        /// Its current state.
        state: ResourceState,
        /// The refused operation (`"start"`, `"unregister"`, ...).
        operation: &'static str,
    },

    /// The host's start or stop callback reported a failure.
    #[error("resource '{resource}' failed: {message}")]
    Host {
        /// The resource whose callback failed.
        resource: String,
        /// The host's description of the failure.
        message: String,
    },

    /// No proxy factory is registered for this entity kind.
    #[error("no proxy factory registered for entity kind {0}")]
    UnsupportedEntity(EntityKind),
}

impl ResourceError {
    /// Creates an [`InvalidManifest`](Self::InvalidManifest).
    pub fn invalid_manifest(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for [`StaleHandle`](Self::StaleHandle), the one error
    /// scripts are expected to recover from by re-querying.
    #[must_use]
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::StaleHandle { .. })
    }
}

/// Failure reported by a [`ResourceHost`](crate::host::ResourceHost) callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(String);

impl HostError {
    /// Creates a host error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur while registering a lifecycle observer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserverError {
    /// An observer with this name is already registered.
    #[error("observer '{0}' is already registered")]
    DuplicateName(String),
}
