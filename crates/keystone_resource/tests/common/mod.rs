//! Shared test helpers for `keystone_resource` integration tests.
//!
//! Import via `mod common;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities, not all items used in every test binary"
)]

use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use keystone_resource::prelude::*;
use parking_lot::Mutex;
use tokio::sync::Notify;

// ═══════════════════════════════════════════════════════════════════════════════
// MOCK HOST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Script {
    log: Vec<String>,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    hang_start: HashSet<String>,
    hang_stop: HashSet<String>,
    gates: HashMap<String, Arc<Notify>>,
    entities: HashMap<String, Vec<EntityId>>,
    running: HashSet<String>,
    exports: HashMap<String, Exports>,
}

/// Scripted host recording every callback as `"start:<name>"` / `"stop:<name>"`.
///
/// Clones share the same script, so a test can keep one handle while the
/// runtime owns another.
#[derive(Clone, Default)]
pub struct MockHost {
    script: Arc<Mutex<Script>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every callback so far, in call order.
    pub fn log(&self) -> Vec<String> {
        self.script.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.script.lock().log.clear();
    }

    pub fn fail_start(&self, name: &str) {
        self.script.lock().fail_start.insert(name.to_string());
    }

    pub fn fail_stop(&self, name: &str) {
        self.script.lock().fail_stop.insert(name.to_string());
    }

    /// Makes `start` never complete.
    pub fn hang_start(&self, name: &str) {
        self.script.lock().hang_start.insert(name.to_string());
    }

    /// Makes `stop` never complete.
    pub fn hang_stop(&self, name: &str) {
        self.script.lock().hang_stop.insert(name.to_string());
    }

    /// Clears every failure and hang set for `name`.
    pub fn heal(&self, name: &str) {
        let mut script = self.script.lock();
        script.fail_start.remove(name);
        script.fail_stop.remove(name);
        script.hang_start.remove(name);
        script.hang_stop.remove(name);
    }

    /// Makes `start` of `name` wait until the returned gate is notified.
    pub fn gate_start(&self, name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script
            .lock()
            .gates
            .insert(name.to_string(), Arc::clone(&gate));
        gate
    }

    /// Native entities `name` owns while it is running.
    pub fn set_entities(&self, name: &str, entities: Vec<EntityId>) {
        self.script.lock().entities.insert(name.to_string(), entities);
    }

    pub fn set_exports(&self, name: &str, exports: Exports) {
        self.script.lock().exports.insert(name.to_string(), exports);
    }

    /// Drops the script runtime of `name` behind the controller's back, as a
    /// crashed runtime would. Its entities are no longer reported.
    pub fn crash(&self, name: &str) {
        self.script.lock().running.remove(name);
    }
}

#[async_trait]
impl ResourceHost for MockHost {
    fn native_entities(&self, resource: &Resource) -> Vec<EntityId> {
        let script = self.script.lock();
        if !script.running.contains(resource.name()) {
            return Vec::new();
        }
        script
            .entities
            .get(resource.name())
            .cloned()
            .unwrap_or_default()
    }

    async fn start(&self, resource: &Resource) -> Result<Exports, HostError> {
        let name = resource.name();
        let (gate, hang, fail, exports) = {
            let mut script = self.script.lock();
            script.log.push(format!("start:{name}"));
            (
                script.gates.remove(name),
                script.hang_start.contains(name),
                script.fail_start.contains(name),
                script.exports.get(name).cloned().unwrap_or_default(),
            )
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }
        if hang {
            core::future::pending::<()>().await;
        }
        if fail {
            return Err(HostError::new(format!("{name} refused to start")));
        }
        self.script.lock().running.insert(name.to_string());
        Ok(exports)
    }

    async fn stop(&self, resource: &Resource) -> Result<(), HostError> {
        let name = resource.name();
        let (hang, fail) = {
            let mut script = self.script.lock();
            script.log.push(format!("stop:{name}"));
            script.running.remove(name);
            (script.hang_stop.contains(name), script.fail_stop.contains(name))
        };

        if hang {
            core::future::pending::<()>().await;
        }
        if fail {
            return Err(HostError::new(format!("{name} refused to stop")));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn manifest(name: &str, deps: &[&str]) -> ResourceManifest {
    deps.iter().fold(
        ResourceManifest::new(name, format!("resources/{name}"), "index.js"),
        |manifest, dep| manifest.depends_on(*dep),
    )
}

pub fn runtime_with(host: &MockHost) -> ResourceRuntime {
    ResourceRuntime::new(RuntimeConfig::default(), host.clone())
}

pub fn fast_timeout_runtime(host: &MockHost) -> ResourceRuntime {
    ResourceRuntime::new(
        RuntimeConfig::default().with_transition_timeout(Duration::from_millis(50)),
        host.clone(),
    )
}

/// `core` ← `auth` ← `game`, registered in that order.
pub async fn scenario(host: &MockHost) -> ResourceRuntime {
    let runtime = runtime_with(host);
    runtime.register(manifest("core", &[])).await.unwrap();
    runtime.register(manifest("auth", &["core"])).await.unwrap();
    runtime.register(manifest("game", &["auth"])).await.unwrap();
    runtime
}

/// Records every lifecycle event as `"<name>:<from>-><to>"`.
pub fn record_events(runtime: &ResourceRuntime) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    runtime
        .register_observer("test-recorder", move |event: &LifecycleEvent| {
            sink.lock()
                .push(format!("{}:{}->{}", event.resource, event.from, event.to));
        })
        .unwrap();
    events
}

pub fn states(runtime: &ResourceRuntime, names: &[&str]) -> Vec<ResourceState> {
    names
        .iter()
        .map(|name| runtime.state(name).unwrap())
        .collect()
}
