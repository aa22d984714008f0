//! The resource registry.
//!
//! Holds one record per registered resource together with the dependency
//! graph. The registry itself is not synchronized; the runtime keeps it
//! behind a read/write lock and hands out [`Resource`] snapshots.

use core::fmt;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ResourceError;
use crate::graph::DependencyGraph;
use crate::host::Exports;
use crate::manifest::ResourceManifest;
use crate::state::ResourceState;

// ─────────────────────────────────────────────────────────────────────────────
// ResourceId
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric id allocated at registration.
///
/// Ids are never reused within a process, so a proxy holding an id can tell
/// a re-registered resource of the same name apart from the one it was
/// created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId(u32);

impl ResourceId {
    /// Returns the raw id.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time snapshot of a registered resource.
///
/// Snapshots are detached copies: they do not follow later state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: ResourceId,
    manifest: ResourceManifest,
    state: ResourceState,
    dependants: Vec<String>,
    exports: Exports,
}

impl Resource {
    /// Returns the registration id.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Returns the directory the resource was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.manifest.path
    }

    /// Returns the entry point, relative to [`path`](Self::path).
    #[must_use]
    pub fn main(&self) -> &str {
        &self.manifest.main
    }

    /// Returns the script runtime tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.manifest.kind
    }

    /// Returns the lifecycle state at snapshot time.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Returns true if the resource was `Started` at snapshot time.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state == ResourceState::Started
    }

    /// Returns the declared dependencies, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.manifest.dependencies
    }

    /// Returns the registered resources that depend on this one.
    #[must_use]
    pub fn dependants(&self) -> &[String] {
        &self.dependants
    }

    /// Returns the exports. Empty unless the resource is running.
    #[must_use]
    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    /// Returns the manifest the resource was registered with.
    #[must_use]
    pub fn manifest(&self) -> &ResourceManifest {
        &self.manifest
    }

    /// Returns the full path of the entry point.
    #[must_use]
    pub fn main_path(&self) -> PathBuf {
        self.manifest.path.join(&self.manifest.main)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Record {
    id: ResourceId,
    manifest: ResourceManifest,
    state: ResourceState,
    exports: Exports,
}

/// Registered resources in registration order, plus their dependency graph.
#[derive(Debug)]
pub(crate) struct Registry {
    records: IndexMap<String, Record>,
    graph: DependencyGraph,
    next_id: u32,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            records: IndexMap::new(),
            graph: DependencyGraph::new(),
            next_id: 1,
        }
    }
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub(crate) fn register(&mut self, manifest: ResourceManifest) -> Result<ResourceId, ResourceError> {
        manifest.validate()?;
        if self.records.contains_key(&manifest.name) {
            return Err(ResourceError::DuplicateName(manifest.name));
        }

        self.graph
            .insert(manifest.name.clone(), manifest.dependencies.clone());
        if let Some(cycle) = self.graph.find_cycle() {
            self.graph.remove(&manifest.name);
            return Err(ResourceError::CyclicDependency { cycle });
        }

        Ok(self.insert_record(manifest))
    }

    /// Registers every manifest or none of them.
    pub(crate) fn register_all(
        &mut self,
        manifests: Vec<ResourceManifest>,
    ) -> Result<Vec<ResourceId>, ResourceError> {
        {
            let mut batch: HashSet<&str> = HashSet::new();
            for manifest in &manifests {
                manifest.validate()?;
                if self.records.contains_key(&manifest.name) || !batch.insert(manifest.name.as_str()) {
                    return Err(ResourceError::DuplicateName(manifest.name.clone()));
                }
            }
        }

        let mut graph = self.graph.clone();
        for manifest in &manifests {
            graph.insert(manifest.name.clone(), manifest.dependencies.clone());
        }
        if let Some(cycle) = graph.find_cycle() {
            return Err(ResourceError::CyclicDependency { cycle });
        }

        self.graph = graph;
        Ok(manifests
            .into_iter()
            .map(|manifest| self.insert_record(manifest))
            .collect())
    }

    fn insert_record(&mut self, manifest: ResourceManifest) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.records.insert(
            manifest.name.clone(),
            Record {
                id,
                manifest,
                state: ResourceState::Stopped,
                exports: Exports::new(),
            },
        );
        id
    }

    /// Removes a stopped resource nothing depends on.
    pub(crate) fn unregister(&mut self, name: &str) -> Result<Resource, ResourceError> {
        let resource = self
            .get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;

        if !matches!(resource.state, ResourceState::Stopped | ResourceState::Error) {
            return Err(ResourceError::InvalidState {
                resource: name.to_string(),
                state: resource.state,
                operation: "unregister",
            });
        }
        if !resource.dependants.is_empty() {
            return Err(ResourceError::HasDependants {
                resource: name.to_string(),
                dependants: resource.dependants,
            });
        }

        self.records.shift_remove(name);
        self.graph.remove(name);
        Ok(resource)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Resource> {
        self.records.get(name).map(|record| self.snapshot(record))
    }

    pub(crate) fn id_of(&self, name: &str) -> Option<ResourceId> {
        self.records.get(name).map(|record| record.id)
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub(crate) fn all(&self) -> Vec<Resource> {
        self.records
            .values()
            .map(|record| self.snapshot(record))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn state(&self, name: &str) -> Option<ResourceState> {
        self.records.get(name).map(|record| record.state)
    }

    /// Moves a resource to `next` and returns the previous state.
    ///
    /// Exports are cleared when the resource reaches `Stopped` or `Error`.
    pub(crate) fn set_state(
        &mut self,
        name: &str,
        next: ResourceState,
    ) -> Result<ResourceState, ResourceError> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;

        let previous = record.state;
        if !previous.can_transition_to(next) {
            return Err(ResourceError::InvalidState {
                resource: name.to_string(),
                state: previous,
                operation: "transition",
            });
        }

        record.state = next;
        if matches!(next, ResourceState::Stopped | ResourceState::Error) {
            record.exports.clear();
        }
        Ok(previous)
    }

    pub(crate) fn set_exports(&mut self, name: &str, exports: Exports) {
        if let Some(record) = self.records.get_mut(name) {
            record.exports = exports;
        }
    }

    fn snapshot(&self, record: &Record) -> Resource {
        Resource {
            id: record.id,
            manifest: record.manifest.clone(),
            state: record.state,
            dependants: self.graph.dependants(&record.manifest.name).to_vec(),
            exports: record.exports.clone(),
        }
    }
}
