//! Identity cache tests: single proxy per entity, invalidation on lifecycle
//! transitions, and concurrent access from script threads.

mod common;

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::{MockHost, manifest, scenario};
use keystone_resource::prelude::*;

const VEHICLE: EntityId = EntityId::new(EntityKind::Vehicle, 7);
const PLAYER: EntityId = EntityId::new(EntityKind::Player, 3);

#[derive(Debug, PartialEq)]
struct VehicleProxy {
    model: &'static str,
}

#[test]
fn one_factory_call_per_entity() {
    let cache = IdentityCache::new();
    let calls = AtomicUsize::new(0);

    let first = cache.get_or_create(VEHICLE, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        VehicleProxy { model: "infernus" }
    });
    let second = cache.get_or_create(VEHICLE, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        VehicleProxy { model: "banshee" }
    });

    assert!(first.ptr_eq(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        second.payload::<VehicleProxy>().unwrap(),
        Some(&VehicleProxy { model: "infernus" })
    );
}

#[test]
fn invalidated_proxy_reports_stale_handle() {
    let cache = IdentityCache::new();
    let proxy = cache.get_or_create(VEHICLE, |_| VehicleProxy { model: "infernus" });

    cache.invalidate(VEHICLE);

    let err = proxy.payload::<VehicleProxy>().unwrap_err();
    assert!(matches!(err, ResourceError::StaleHandle { entity } if entity == VEHICLE));
    assert!(cache.lookup(VEHICLE).is_none());
}

#[test]
fn contexts_have_independent_caches() {
    let runtime = ResourceRuntime::new(RuntimeConfig::default(), NoopHost);
    let a = runtime.create_context(None);
    let b = runtime.create_context(None);
    assert_ne!(a.id(), b.id());

    let in_a = a.cache().get_or_create(PLAYER, |_| "a");
    let in_b = b.cache().get_or_create(PLAYER, |_| "b");
    assert!(!in_a.ptr_eq(&in_b));

    b.teardown();
    assert!(in_b.is_detached());
    assert!(!in_a.is_detached());
}

#[test]
fn dropping_a_context_detaches_its_proxies() {
    let runtime = ResourceRuntime::new(RuntimeConfig::default(), NoopHost);
    let context = runtime.create_context(None);
    let proxy = context.cache().get_or_create(PLAYER, |_| ());
    assert_eq!(runtime.context_count(), 1);

    drop(context);

    assert!(proxy.is_detached());
    assert_eq!(runtime.context_count(), 0);
}

#[test]
fn concurrent_get_or_create_yields_one_proxy() {
    const THREADS: usize = 8;

    let cache = Arc::new(IdentityCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_create(VEHICLE, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    VehicleProxy { model: "infernus" }
                })
            })
        })
        .collect();

    let proxies: Vec<Proxy> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(proxies.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
}

#[tokio::test]
async fn owned_entities_are_invalidated_on_transitions() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.set_entities("game", vec![VEHICLE]);

    let context = runtime.create_context(Some("game"));
    let before = context.cache().get_or_create(VEHICLE, |_| VehicleProxy { model: "old" });

    runtime.start("game").await.unwrap();
    assert!(before.ensure_attached().unwrap_err().is_stale_handle());

    let running = context.cache().get_or_create(VEHICLE, |_| VehicleProxy { model: "new" });
    assert!(!running.is_detached());

    runtime.stop("game", false).await.unwrap();
    assert!(running.is_detached());
}

#[tokio::test]
async fn unowned_entities_survive_transitions() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.set_entities("game", vec![VEHICLE]);

    let context = runtime.create_context(None);
    let player = context.cache().get_or_create(PLAYER, |_| ());

    runtime.start("game").await.unwrap();
    runtime.stop("game", false).await.unwrap();

    assert!(!player.is_detached());
}

#[tokio::test]
async fn factory_table_dispatches_and_rejects_unknown_kinds() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    runtime.register(manifest("garage", &[])).await.unwrap();

    let factories = ProxyFactories::new()
        .with(EntityKind::Vehicle, |entity| VehicleProxy {
            model: if entity.id() == 7 { "infernus" } else { "unknown" },
        });
    let context = runtime.create_context(Some("garage"));

    let vehicle = context.cache().get_or_create_with(VEHICLE, &factories).unwrap();
    assert_eq!(
        vehicle.payload::<VehicleProxy>().unwrap(),
        Some(&VehicleProxy { model: "infernus" })
    );
    assert!(
        context
            .cache()
            .get_or_create_with(VEHICLE, &factories)
            .unwrap()
            .ptr_eq(&vehicle)
    );

    let err = context.cache().get_or_create_with(PLAYER, &factories).unwrap_err();
    assert!(matches!(err, ResourceError::UnsupportedEntity(EntityKind::Player)));
}

#[tokio::test]
async fn stop_detaches_entities_the_host_has_already_released() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.set_entities("game", vec![VEHICLE]);

    runtime.start("game").await.unwrap();
    let context = runtime.create_context(Some("game"));
    let car = context.cache().get_or_create(VEHICLE, |_| "car");

    runtime.stop("game", false).await.unwrap();

    assert!(car.is_detached());
    let err = car.payload::<&'static str>().unwrap_err();
    assert!(matches!(err, ResourceError::StaleHandle { entity } if entity == VEHICLE));
    assert!(context.cache().lookup(VEHICLE).is_none());
}

#[tokio::test]
async fn failed_stop_still_detaches_owned_entities() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.set_entities("game", vec![VEHICLE]);
    host.fail_stop("game");

    runtime.start("game").await.unwrap();
    let context = runtime.create_context(None);
    let car = context.cache().get_or_create(VEHICLE, |_| "car");

    let err = runtime.stop("game", false).await.unwrap_err();

    assert!(matches!(err, ResourceError::Host { .. }));
    assert_eq!(runtime.state("game"), Some(ResourceState::Stopped));
    assert!(car.is_detached());
}

#[tokio::test]
async fn reported_failure_detaches_entities_of_the_crashed_runtime() {
    let host = MockHost::new();
    let runtime = scenario(&host).await;
    host.set_entities("game", vec![VEHICLE]);

    runtime.start("game").await.unwrap();
    let context = runtime.create_context(None);
    let car = context.cache().get_or_create(VEHICLE, |_| "car");
    let player = context.cache().get_or_create(PLAYER, |_| ());

    host.crash("game");
    runtime.report_failure("game", "script runtime died").await.unwrap();

    assert_eq!(runtime.state("game"), Some(ResourceState::Error));
    assert!(car.is_detached());
    assert!(!player.is_detached());
}
