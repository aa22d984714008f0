//! Dependency graph between registered resources.
//!
//! Edges point from a resource to the resources it depends on. The graph
//! keeps registration order (it drives every tie-break) and caches the
//! inverted edge set so dependant lookups never scan the whole graph.
//!
//! Dependencies may name resources that are not registered yet. Such edges
//! are kept but ignored by cycle detection until the target shows up;
//! [`start_order`](DependencyGraph::start_order) reports them as
//! [`ResourceError::NotFound`].

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use crate::error::ResourceError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Directed acyclic graph of resource dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Resource name to declared dependencies, in registration order.
    edges: IndexMap<String, Vec<String>>,
    /// Dependency name to the registered resources declaring it, in registration order.
    dependants: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource and its declared dependencies.
    ///
    /// Does not check for cycles; call [`find_cycle`](Self::find_cycle) after
    /// inserting and roll back with [`remove`](Self::remove) if one appears.
    pub fn insert(&mut self, name: impl Into<String>, dependencies: Vec<String>) {
        let name = name.into();
        for dependency in &dependencies {
            self.dependants
                .entry(dependency.clone())
                .or_default()
                .push(name.clone());
        }
        self.edges.insert(name, dependencies);
    }

    /// Removes a resource and its outgoing edges.
    ///
    /// Edges other resources declare towards it are kept.
    pub fn remove(&mut self, name: &str) {
        let Some(dependencies) = self.edges.shift_remove(name) else {
            return;
        };
        for dependency in dependencies {
            if let Some(list) = self.dependants.get_mut(dependency.as_str()) {
                list.retain(|dependant| dependant != name);
                if list.is_empty() {
                    self.dependants.remove(dependency.as_str());
                }
            }
        }
    }

    /// Returns true if the resource is in the graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Returns the number of resources in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns the declared dependencies of a resource.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.edges.get(name).map(Vec::as_slice)
    }

    /// Returns the resources that directly depend on `name`, in registration order.
    #[must_use]
    pub fn dependants(&self, name: &str) -> &[String] {
        self.dependants.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns every resource that transitively depends on `name`.
    ///
    /// Deepest dependants come first, so stopping in this order never stops a
    /// resource while something that needs it is still running.
    pub fn transitive_dependants(&self, name: &str) -> Result<Vec<String>, ResourceError> {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = vec![name];
        while let Some(current) = pending.pop() {
            for dependant in self.dependants(current) {
                if dependant != name && reached.insert(dependant.as_str()) {
                    pending.push(dependant.as_str());
                }
            }
        }

        let mut order = self.order_subset(&reached)?;
        order.reverse();
        Ok(order)
    }

    /// Returns `root` and all of its transitive dependencies, dependencies first.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if `root` or any dependency on the way is
    ///   not registered.
    /// - [`ResourceError::CyclicDependency`] if the closure contains a cycle.
    pub fn start_order(&self, root: &str) -> Result<Vec<String>, ResourceError> {
        let Some((root, _)) = self.edges.get_key_value(root) else {
            return Err(ResourceError::NotFound(root.to_string()));
        };

        let mut closure: HashSet<&str> = HashSet::new();
        closure.insert(root.as_str());
        let mut pending = vec![root.as_str()];

        while let Some(current) = pending.pop() {
            for dependency in self.dependencies(current).unwrap_or_default() {
                if !self.contains(dependency) {
                    return Err(ResourceError::NotFound(dependency.clone()));
                }
                if closure.insert(dependency.as_str()) {
                    pending.push(dependency.as_str());
                }
            }
        }

        self.order_subset(&closure)
    }

    /// Returns every registered resource, dependencies first.
    ///
    /// Dependencies on unregistered resources are ignored.
    pub fn full_order(&self) -> Result<Vec<String>, ResourceError> {
        let everything: HashSet<&str> = self.edges.keys().map(String::as_str).collect();
        self.order_subset(&everything)
    }

    /// Finds a dependency cycle among registered resources.
    ///
    /// The returned path starts and ends with the same resource.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        self.edges
            .keys()
            .find_map(|name| self.visit(name, &mut marks, &mut path))
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|entry| *entry == name)?;
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);

        for dependency in self.dependencies(name).unwrap_or_default() {
            if !self.contains(dependency) {
                continue;
            }
            if let Some(cycle) = self.visit(dependency, marks, path) {
                return Some(cycle);
            }
        }

        path.pop();
        marks.insert(name, Mark::Done);
        None
    }

    /// Kahn's algorithm restricted to `subset`. Ties go to the earliest registered.
    fn order_subset(&self, subset: &HashSet<&str>) -> Result<Vec<String>, ResourceError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(subset.len());
        let mut ready: BTreeSet<usize> = BTreeSet::new();

        for &node in subset {
            let degree = self.dependencies(node).map_or(0, |deps| {
                deps.iter()
                    .filter(|dep| subset.contains(dep.as_str()))
                    .count()
            });
            in_degree.insert(node, degree);
            if degree == 0
                && let Some(index) = self.edges.get_index_of(node)
            {
                ready.insert(index);
            }
        }

        let mut order = Vec::with_capacity(subset.len());
        while let Some(index) = ready.pop_first() {
            let Some((name, _)) = self.edges.get_index(index) else {
                continue;
            };
            order.push(name.clone());

            for dependant in self.dependants(name) {
                let Some(degree) = in_degree.get_mut(dependant.as_str()) else {
                    continue;
                };
                *degree -= 1;
                if *degree == 0
                    && let Some(next) = self.edges.get_index_of(dependant.as_str())
                {
                    ready.insert(next);
                }
            }
        }

        if order.len() < subset.len() {
            let cycle = self.find_cycle().unwrap_or_else(|| {
                subset
                    .iter()
                    .copied()
                    .filter(|node| !order.iter().any(|done| done.as_str() == *node))
                    .map(str::to_string)
                    .collect()
            });
            return Err(ResourceError::CyclicDependency { cycle });
        }

        Ok(order)
    }
}
