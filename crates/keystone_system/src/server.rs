//! Server runtime for plugin orchestration.
//!
//! The [`Server`] is the process-wide object a game server creates at start
//! up and tears down at shutdown. It owns the plugin list, the state stores,
//! and the APIs plugins publish for each other.
//!
//! # State Scoping
//!
//! - **Global state** - configuration and metadata, read through
//!   [`get_global()`](Server::get_global)
//! - **Server state** - scratch values plugins hand to each other while
//!   building, read and written through [`get_state()`](Server::get_state) and
//!   [`get_state_mut()`](Server::get_state_mut)
//!
//! # Lifecycle
//!
//! 1. **Dependency Resolution** - validate and topologically sort plugins
//! 2. **Build Phase** - `plugin.build()` in dependency order
//! 3. **Ready Phase** - `plugin.ready()` in dependency order
//! 4. **Cleanup Phase** - `plugin.cleanup()` in reverse order

use crate::api::API;
use crate::plugin::{Plugin, PluginId, Plugins};
use crate::state::{StateRef, StateRefMut, States};
use core::any::TypeId;
use hashbrown::{HashMap, HashSet};

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

type BoxedAPI = Box<dyn core::any::Any + Send + Sync>;

/// Build progress of the server.
///
/// Advances linearly: `NotStarted` → `Building` → `Built` → `CleanedUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuildState {
    #[default]
    NotStarted,
    /// `finish()` is executing.
    Building,
    /// `finish()` has returned.
    Built,
    /// `cleanup()` has run.
    CleanedUp,
}

/// The runtime that orchestrates plugins and owns shared state.
///
/// # Example
///
/// ```ignore
/// let mut server = Server::new();
/// server
///     .add_plugins(TracingPlugin::default())
///     .add_plugins(ResourcesPlugin::new(host));
/// server.run();
/// // ... serve players ...
/// server.cleanup();
/// ```
pub struct Server {
    /// Configuration and metadata shared with everything that holds the server.
    global: States,

    /// Values plugins exchange during the build phase.
    state: States,

    /// Services published by plugins, keyed by type.
    apis: HashMap<TypeId, BoxedAPI>,

    /// Plugins added but not yet sorted and built.
    pending_plugins: Vec<PluginEntry>,

    /// Built plugins, in dependency order.
    built_plugins: Vec<PluginEntry>,

    /// Ids of every plugin added so far, for duplicate detection.
    plugin_ids: HashSet<PluginId>,

    build_state: BuildState,
}

struct PluginEntry {
    id: PluginId,
    plugin: Box<dyn Plugin>,
}

impl PluginEntry {
    fn name(&self) -> &str {
        self.plugin.name()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a server with no plugins and no state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            global: States::new(),
            state: States::new(),
            apis: HashMap::new(),
            pending_plugins: Vec::new(),
            built_plugins: Vec::new(),
            plugin_ids: HashSet::new(),
            build_state: BuildState::NotStarted,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a plugin or a [`PluginGroupBuilder`](crate::plugin::PluginGroupBuilder).
    ///
    /// # Panics
    ///
    /// Panics if a unique plugin is added twice.
    pub fn add_plugins<P: Plugins>(&mut self, plugins: P) -> &mut Self {
        plugins.add_to_server(self);
        self
    }

    pub(crate) fn add_plugin_boxed(&mut self, id: PluginId, plugin: Box<dyn Plugin>) {
        if plugin.is_unique() && self.plugin_ids.contains(&id) {
            panic!(
                "Plugin '{}' is unique and was already added.\n\
                 If you intended to add this plugin multiple times, \
                 return `false` from `is_unique()`.",
                plugin.name()
            );
        }
        self.plugin_ids.insert(id);

        let entry = PluginEntry { id, plugin };

        // Plugins added from inside another plugin's build() are built right away.
        if self.build_state == BuildState::Building {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        } else {
            self.pending_plugins.push(entry);
        }
    }

    /// Returns true if a plugin of type `P` has been added.
    #[must_use]
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        let id = PluginId::of::<P>();
        self.pending_plugins
            .iter()
            .chain(self.built_plugins.iter())
            .any(|p| p.id == id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Server State
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a server-state value, returning the previous one of that type.
    pub fn insert_state<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.state.insert(value)
    }

    /// Returns true if a server-state value of type `T` exists.
    #[must_use]
    pub fn contains_state<T: Send + Sync + 'static>(&self) -> bool {
        self.state.contains::<T>()
    }

    /// Borrows a server-state value. `None` if absent or mutably borrowed.
    #[must_use]
    pub fn get_state<T: Send + Sync + 'static>(&self) -> Option<StateRef<'_, T>> {
        self.state.get::<T>().ok()
    }

    /// Mutably borrows a server-state value. `None` if absent or borrowed.
    #[must_use]
    pub fn get_state_mut<T: Send + Sync + 'static>(&self) -> Option<StateRefMut<'_, T>> {
        self.state.get_mut::<T>().ok()
    }

    /// Removes a server-state value and returns it.
    pub fn remove_state<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.state.remove::<T>()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Global State
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a global value, returning the previous one of that type.
    ///
    /// Global values are read-only for everyone but the server itself.
    pub fn insert_global<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.global.insert(value)
    }

    /// Returns true if a global value of type `T` exists.
    #[must_use]
    pub fn contains_global<T: Send + Sync + 'static>(&self) -> bool {
        self.global.contains::<T>()
    }

    /// Borrows a global value.
    #[must_use]
    pub fn get_global<T: Send + Sync + 'static>(&self) -> Option<StateRef<'_, T>> {
        self.global.get::<T>().ok()
    }

    /// Returns the global store.
    #[must_use]
    pub fn global_states(&self) -> &States {
        &self.global
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Publishes an API, returning the previous one of the same type.
    pub fn insert_api<A: API>(&mut self, api: A) -> Option<A> {
        self.apis
            .insert(TypeId::of::<A>(), Box::new(api))
            .and_then(|old| old.downcast::<A>().ok())
            .map(|b| *b)
    }

    /// Returns the API of type `A`, if one was published.
    #[must_use]
    pub fn api<A: API>(&self) -> Option<&A> {
        self.apis
            .get(&TypeId::of::<A>())
            .and_then(|boxed| boxed.downcast_ref::<A>())
    }

    /// Returns true if an API of type `A` was published.
    #[must_use]
    pub fn contains_api<A: API>(&self) -> bool {
        self.apis.contains_key(&TypeId::of::<A>())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns whether `finish()` has completed.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.build_state == BuildState::Built
    }

    /// Sorts, builds and readies every pending plugin.
    ///
    /// # Panics
    ///
    /// - If a plugin's dependency was never added
    /// - If plugin dependencies form a cycle
    /// - If called more than once
    pub fn finish(&mut self) {
        if self.build_state != BuildState::NotStarted {
            panic!("Server::finish() was already called. Cannot build twice.");
        }

        let sorted_plugins = self.sort_plugins_by_dependencies();

        self.build_state = BuildState::Building;
        for entry in sorted_plugins {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        }

        // ready() takes &mut Server, so the list is moved out while it runs.
        let plugins = core::mem::take(&mut self.built_plugins);
        for entry in &plugins {
            entry.plugin.ready(self);
        }
        let added_during_ready = core::mem::replace(&mut self.built_plugins, plugins);
        self.built_plugins.extend(added_during_ready);

        self.build_state = BuildState::Built;
    }

    /// Builds the server. Alias for [`finish()`](Self::finish).
    pub fn run(&mut self) {
        self.finish();
    }

    /// Cleans up every built plugin in reverse dependency order.
    ///
    /// Calling it more than once is a no-op.
    pub fn cleanup(&mut self) {
        if self.build_state == BuildState::CleanedUp {
            return;
        }

        let plugins = core::mem::take(&mut self.built_plugins);
        for entry in plugins.iter().rev() {
            entry.plugin.cleanup(self);
        }
        self.built_plugins = plugins;
        self.build_state = BuildState::CleanedUp;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal: Dependency Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Orders pending plugins so that each comes after its dependencies.
    ///
    /// Plugins with no ordering constraint keep the order they were added in.
    fn sort_plugins_by_dependencies(&mut self) -> Vec<PluginEntry> {
        let pending = core::mem::take(&mut self.pending_plugins);
        let n = pending.len();
        if n == 0 {
            return Vec::new();
        }

        let mut index_of: HashMap<PluginId, usize> = HashMap::new();
        for (i, entry) in pending.iter().enumerate() {
            index_of.entry(entry.id).or_insert(i);
        }

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in pending.iter().enumerate() {
            for dep in entry.plugin.dependencies() {
                if let Some(&dep_idx) = index_of.get(&dep) {
                    dependents[dep_idx].push(i);
                    in_degree[i] += 1;
                } else if !self.built_plugins.iter().any(|p| p.id == dep) {
                    panic!(
                        "Plugin '{}' requires '{}' which was not added.\n\
                         Add {} before {}, or use a plugin group that includes it.",
                        entry.name(),
                        dep.type_name(),
                        dep.type_name(),
                        entry.name()
                    );
                }
            }
        }

        // Kahn's algorithm; always taking the lowest ready index keeps
        // unconstrained plugins in insertion order.
        let mut ready: std::collections::BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != n {
            let in_cycle: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| pending[i].name())
                .collect();

            panic!(
                "Circular dependency detected among plugins: {:?}\n\
                 Break the cycle by extracting shared functionality into a separate plugin.",
                in_cycle
            );
        }

        let mut slots: Vec<Option<PluginEntry>> = pending.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}
