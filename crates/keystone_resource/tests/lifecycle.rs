//! Lifecycle controller tests: ordering, cascades, rollback, timeouts and recovery.

mod common;

use core::time::Duration;

use common::{MockHost, fast_timeout_runtime, manifest, record_events, runtime_with, scenario, states};
use keystone_resource::prelude::*;
use keystone_resource::state::ResourceState::{Error, Started, Stopped};

// ─────────────────────────────────────────────────────────────────────────
// Start
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_brings_up_dependencies_first() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;

    let started = runtime.start("game").await.unwrap();

    assert_eq!(started, vec!["core", "auth", "game"]);
    assert_eq!(host.log(), vec!["start:core", "start:auth", "start:game"]);
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Started; 3]);
}

#[tokio::test]
async fn start_publishes_every_transition_in_order() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    let events = record_events(&runtime);

    runtime.start("game").await.unwrap();

    assert_eq!(
        *events.lock(),
        vec![
            "core:stopped->starting",
            "core:starting->started",
            "auth:stopped->starting",
            "auth:starting->started",
            "game:stopped->starting",
            "game:starting->started",
        ]
    );
}

#[tokio::test]
async fn start_is_a_noop_when_already_started() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("auth").await.unwrap();
    host.clear_log();

    assert!(runtime.start("auth").await.unwrap().is_empty());
    assert_eq!(runtime.start("game").await.unwrap(), vec!["game"]);
    assert_eq!(host.log(), vec!["start:game"]);
}

#[tokio::test]
async fn start_unknown_resource_is_not_found() {
    let runtime = runtime_with(&MockHost::new());
    let err = runtime.start("ghost").await.unwrap_err();
    assert!(matches!(err, ResourceError::NotFound(ref name) if name == "ghost"));
}

#[tokio::test]
async fn start_publishes_exports_until_stopped() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;

    let mut exports = Exports::new();
    exports.insert("version".into(), 2.into());
    host.set_exports("core", exports);

    runtime.start("core").await.unwrap();
    assert_eq!(runtime.get("core").unwrap().exports()["version"], 2);

    runtime.stop("core", false).await.unwrap();
    assert!(runtime.get("core").unwrap().exports().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// Rollback
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_dependency_rolls_back_the_chain() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.fail_start("auth");

    let err = runtime.start("game").await.unwrap_err();

    let ResourceError::DependencyStartFailed { dependency, source } = err else {
        panic!("expected DependencyStartFailed, got {err:?}");
    };
    assert_eq!(dependency, "auth");
    assert!(matches!(*source, ResourceError::Host { ref resource, .. } if resource == "auth"));

    assert_eq!(host.log(), vec!["start:core", "start:auth", "stop:core"]);
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Stopped, Error, Stopped]);
}

#[tokio::test]
async fn failed_dependency_blocks_dependants_until_reset() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.fail_start("auth");
    runtime.start("game").await.unwrap_err();
    host.heal("auth");

    let err = runtime.start("game").await.unwrap_err();
    let ResourceError::DependencyStartFailed { dependency, source } = err else {
        panic!("expected DependencyStartFailed, got {err:?}");
    };
    assert_eq!(dependency, "auth");
    assert!(matches!(*source, ResourceError::InvalidState { state: Error, .. }));

    runtime.reset("auth").await.unwrap();
    runtime.start("game").await.unwrap();
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Started, Started, Started]);
}

#[tokio::test]
async fn failing_root_reports_its_own_error() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.fail_start("game");

    let err = runtime.start("game").await.unwrap_err();

    assert!(matches!(err, ResourceError::Host { ref resource, .. } if resource == "game"));
    assert_eq!(
        host.log(),
        vec!["start:core", "start:auth", "start:game", "stop:auth", "stop:core"]
    );
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Stopped, Stopped, Error]);
}

#[tokio::test]
async fn rollback_leaves_resources_outside_the_call_alone() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.register(manifest("chat", &["core"])).await.unwrap();
    runtime.start("chat").await.unwrap();
    host.fail_start("game");

    runtime.start("game").await.unwrap_err();

    assert_eq!(
        states(&runtime, &["core", "chat", "auth", "game"]),
        vec![Started, Started, Stopped, Error]
    );
}

#[tokio::test]
async fn missing_dependency_fails_without_touching_anything() {
    let host = MockHost::new();
    let runtime = runtime_with(&host);
    runtime.register(manifest("shop", &["economy"])).await.unwrap();

    let err = runtime.start("shop").await.unwrap_err();

    let ResourceError::DependencyStartFailed { dependency, source } = err else {
        panic!("expected DependencyStartFailed, got {err:?}");
    };
    assert_eq!(dependency, "economy");
    assert!(matches!(*source, ResourceError::NotFound(_)));
    assert!(host.log().is_empty());
    assert_eq!(runtime.state("shop"), Some(Stopped));
}

// ─────────────────────────────────────────────────────────────────────────
// Stop
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_refuses_while_dependants_run() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("game").await.unwrap();

    let err = runtime.stop("core", false).await.unwrap_err();

    assert!(matches!(
        err,
        ResourceError::HasActiveDependants { ref dependants, .. } if dependants == &["game", "auth"]
    ));
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Started; 3]);
}

#[tokio::test]
async fn cascade_stop_goes_deepest_first() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("game").await.unwrap();
    host.clear_log();

    let stopped = runtime.stop("core", true).await.unwrap();

    assert_eq!(stopped, vec!["game", "auth", "core"]);
    assert_eq!(host.log(), vec!["stop:game", "stop:auth", "stop:core"]);
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Stopped; 3]);
}

#[tokio::test]
async fn stop_is_a_noop_when_already_stopped() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    assert!(runtime.stop("core", false).await.unwrap().is_empty());
    assert!(host.log().is_empty());
}

#[tokio::test]
async fn stop_ignores_stopped_dependants() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("core").await.unwrap();

    assert_eq!(runtime.stop("core", false).await.unwrap(), vec!["core"]);
}

#[tokio::test]
async fn failing_host_stop_still_stops() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("core").await.unwrap();
    host.fail_stop("core");

    let err = runtime.stop("core", false).await.unwrap_err();

    assert!(matches!(err, ResourceError::Host { .. }));
    assert_eq!(runtime.state("core"), Some(Stopped));
}

#[tokio::test]
async fn cascade_continues_past_failures_and_reports_the_first() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("game").await.unwrap();
    host.fail_stop("game");
    host.clear_log();

    let err = runtime.stop("core", true).await.unwrap_err();

    assert!(matches!(err, ResourceError::Host { ref resource, .. } if resource == "game"));
    assert_eq!(host.log(), vec!["stop:game", "stop:auth", "stop:core"]);
    assert_eq!(states(&runtime, &["core", "auth", "game"]), vec![Stopped; 3]);
}

// ─────────────────────────────────────────────────────────────────────────
// Restart
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cascade_restart_brings_dependants_back() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("game").await.unwrap();
    host.clear_log();

    let started = runtime.restart("core", true).await.unwrap();

    assert_eq!(started, vec!["core", "auth", "game"]);
    assert_eq!(
        host.log(),
        vec![
            "stop:game",
            "stop:auth",
            "stop:core",
            "start:core",
            "start:auth",
            "start:game"
        ]
    );
}

#[tokio::test]
async fn restart_without_cascade_refuses_running_dependants() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("game").await.unwrap();
    host.clear_log();

    let err = runtime.restart("auth", false).await.unwrap_err();

    assert!(matches!(err, ResourceError::HasActiveDependants { .. }));
    assert!(host.log().is_empty());
}

#[tokio::test]
async fn restart_skips_start_when_stop_fails() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("core").await.unwrap();
    host.fail_stop("core");
    host.clear_log();

    runtime.restart("core", false).await.unwrap_err();

    assert_eq!(host.log(), vec!["stop:core"]);
    assert_eq!(runtime.state("core"), Some(Stopped));
}

#[tokio::test]
async fn restart_of_stopped_resource_starts_it() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;

    assert_eq!(runtime.restart("auth", false).await.unwrap(), vec!["core", "auth"]);
}

// ─────────────────────────────────────────────────────────────────────────
// Timeouts and in-flight transitions
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hanging_start_times_out_into_error() {
    let host = MockHost::new();
    let runtime = fast_timeout_runtime(&host);
    runtime.register(manifest("core", &[])).await.unwrap();
    host.hang_start("core");

    let err = runtime.start("core").await.unwrap_err();

    assert!(matches!(
        err,
        ResourceError::Timeout { state: ResourceState::Starting, timeout, .. }
            if timeout == Duration::from_millis(50)
    ));
    assert_eq!(runtime.state("core"), Some(Error));
}

#[tokio::test]
async fn hanging_stop_times_out_into_error() {
    let host = MockHost::new();
    let runtime = fast_timeout_runtime(&host);
    runtime.register(manifest("core", &[])).await.unwrap();
    runtime.start("core").await.unwrap();
    host.hang_stop("core");

    let err = runtime.stop("core", false).await.unwrap_err();

    assert!(matches!(err, ResourceError::Timeout { state: ResourceState::Stopping, .. }));
    assert_eq!(runtime.state("core"), Some(Error));
}

#[tokio::test]
async fn in_flight_start_is_never_waited_on() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    let gate = host.gate_start("core");

    let pending = tokio::spawn({
        let runtime = runtime.clone();
        async move { runtime.start("core").await }
    });

    for _ in 0..1000 {
        if runtime.state("core") == Some(ResourceState::Starting) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(runtime.state("core"), Some(ResourceState::Starting));

    assert!(runtime.start("core").await.unwrap().is_empty());
    let err = runtime.stop("core", false).await.unwrap_err();
    assert!(matches!(
        err,
        ResourceError::AlreadyInProgress { state: ResourceState::Starting, .. }
    ));

    gate.notify_one();
    assert_eq!(pending.await.unwrap().unwrap(), vec!["core"]);
    assert_eq!(runtime.state("core"), Some(Started));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_run_each_host_callback_once() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.start("game").await })
        })
        .collect();

    let mut started = Vec::new();
    for task in tasks {
        started.extend(task.await.unwrap().unwrap());
    }

    assert_eq!(started.len(), 3);
    assert_eq!(host.log(), vec!["start:core", "start:auth", "start:game"]);
}

// ─────────────────────────────────────────────────────────────────────────
// Failure reporting and recovery
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_requires_reset_before_start() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.fail_start("core");
    runtime.start("core").await.unwrap_err();

    let err = runtime.start("core").await.unwrap_err();
    assert!(matches!(err, ResourceError::InvalidState { operation: "start", .. }));
    let err = runtime.stop("core", false).await.unwrap_err();
    assert!(matches!(err, ResourceError::InvalidState { operation: "stop", .. }));

    runtime.reset("core").await.unwrap();
    host.heal("core");
    assert_eq!(runtime.start("core").await.unwrap(), vec!["core"]);
}

#[tokio::test]
async fn dependency_in_error_blocks_dependant_start() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.fail_start("core");
    runtime.start("core").await.unwrap_err();
    host.clear_log();

    let err = runtime.start("auth").await.unwrap_err();

    assert!(matches!(
        err,
        ResourceError::DependencyStartFailed { ref dependency, .. } if dependency == "core"
    ));
    assert!(host.log().is_empty());
}

#[tokio::test]
async fn report_failure_moves_started_to_error() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.start("core").await.unwrap();
    let events = record_events(&runtime);

    runtime.report_failure("core", "script runtime crashed").await.unwrap();

    assert_eq!(runtime.state("core"), Some(Error));
    assert_eq!(*events.lock(), vec!["core:started->error"]);

    let err = runtime.report_failure("auth", "nope").await.unwrap_err();
    assert!(matches!(err, ResourceError::InvalidState { .. }));

    let err = runtime.reset("auth").await.unwrap_err();
    assert!(matches!(err, ResourceError::InvalidState { operation: "reset", .. }));
}

// ─────────────────────────────────────────────────────────────────────────
// Shutdown
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_stops_in_reverse_dependency_order() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.register(manifest("chat", &["core"])).await.unwrap();
    runtime.start("game").await.unwrap();
    runtime.start("chat").await.unwrap();
    let context = runtime.create_context(Some("game"));
    host.clear_log();

    let stopped = runtime.shutdown().await.unwrap();

    assert_eq!(stopped, vec!["chat", "game", "auth", "core"]);
    assert_eq!(host.log(), vec!["stop:chat", "stop:game", "stop:auth", "stop:core"]);
    assert!(context.is_torn_down());
}

#[tokio::test]
async fn shutdown_without_stopping_only_tears_down() {
    let host = MockHost::new();
    let runtime = ResourceRuntime::new(
        RuntimeConfig::default().with_stop_on_shutdown(false),
        host.clone(),
    );
    runtime.register(manifest("core", &[])).await.unwrap();
    runtime.start("core").await.unwrap();
    let context = runtime.create_context(None);

    assert!(runtime.shutdown().await.unwrap().is_empty());
    assert_eq!(runtime.state("core"), Some(Started));
    assert!(context.is_torn_down());
}
