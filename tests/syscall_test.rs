mod common;

use common::{params, purifier_system};
use rosix::error::Capability;
use rosix::model::{Params, Thing};
use rosix::resource::{ResourceType, ThingAdapter};
use rosix::syscall::{Event, EventType, OpenMode};
use rosix::RosixError;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The purifier scenario: every step contributes to the result and the actor's
/// last_active moves forward.
#[tokio::test]
async fn test_purify_air_through_syscall_layer() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());

    let rd = system
        .open("/things/machine/purifier-1", OpenMode::READ | OpenMode::INVOKE, &ctx)
        .expect("open");
    let before = chrono::Utc::now();

    let result = system
        .invoke(
            rd,
            "purify_air",
            params(json!({"air_quality": 150.0, "target_quality": 50.0})),
        )
        .await
        .expect("invoke");

    for key in ["current_quality", "fan_started", "filter_activated", "progress"] {
        assert!(result.contains_key(key), "missing {key} in {result:?}");
    }
    assert_eq!(result["current_quality"], 150.0);
    assert!(!result.contains_key("fallback"));

    let status = system
        .manager()
        .actor_status("air_purifier")
        .await
        .expect("status");
    assert!(status.last_active >= before);
    assert_eq!(status.processed, 2);

    // The actor is visible as a resource too, with live features.
    let actor_rd = system
        .open("/actors/air_purifier", OpenMode::READ, &ctx)
        .expect("open actor");
    assert_eq!(system.read(actor_rd, "status").unwrap(), "running");
    assert_eq!(system.read(actor_rd, "processed").unwrap(), 2);
}

#[tokio::test]
async fn test_guard_skips_work_below_target() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system
        .open("/things/machine/purifier-1", OpenMode::INVOKE, &ctx)
        .unwrap();

    let result = system
        .invoke(rd, "purify_air", params(json!({"air_quality": 20.0})))
        .await
        .unwrap();
    assert!(!result.contains_key("fan_started"));
    assert!(!result.contains_key("filter_activated"));
    assert!(result.contains_key("progress"));
}

#[tokio::test]
async fn test_invoke_validation_errors_surface() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system
        .open("/things/machine/purifier-1", OpenMode::INVOKE, &ctx)
        .unwrap();

    for bad in [json!({}), json!({"air_quality": "150"}), json!({"air_quality": 600})] {
        let err = system
            .invoke(rd, "purify_air", params(bad.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, RosixError::Validation(_)), "{bad} gave {err:?}");
    }

    let err = system
        .invoke(rd, "make_coffee", Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RosixError::NotFound(_)));
}

#[tokio::test]
async fn test_descriptors_are_never_reused() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let rd = system
            .open("/things/machine/purifier-1", OpenMode::READ, &ctx)
            .unwrap();
        assert!(seen.insert(rd), "descriptor {rd} handed out twice");
        system.close(rd).unwrap();
    }
    let raws: Vec<i64> = {
        let mut v: Vec<_> = seen.iter().map(|rd| rd.raw()).collect();
        v.sort();
        v
    };
    assert_eq!(raws.first(), Some(&1001));
    assert_eq!(raws.last(), Some(&1020));
}

#[tokio::test]
async fn test_read_after_close_is_not_found() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system
        .open("/things/machine/purifier-1", OpenMode::READ, &ctx)
        .unwrap();
    assert_eq!(system.read(rd, "power").unwrap(), "off");

    system.close(rd).unwrap();
    assert!(matches!(system.read(rd, "power"), Err(RosixError::NotFound(_))));
    assert!(matches!(system.stat(rd), Err(RosixError::NotFound(_))));
    assert!(matches!(system.close(rd), Err(RosixError::NotFound(_))));
}

#[tokio::test]
async fn test_write_requires_write_bit_for_every_type() {
    let (system, things) = purifier_system().await;
    for thing in [
        Thing::new("cup", "Cup", "object"),
        Thing::new("bob", "Bob", "person"),
        Thing::new("weather", "Weather", "service"),
    ] {
        things.insert(thing);
    }
    system.sync_resources().await.unwrap();

    let ctx = system.create_context("alice", "s1", Params::new());
    let without_write = OpenMode::READ | OpenMode::INVOKE | OpenMode::WATCH;
    let paths = [
        "/things/machine/purifier-1",
        "/things/object/cup",
        "/things/person/bob",
        "/things/service/weather",
        "/actors/air_purifier",
    ];

    let mut types = HashSet::new();
    for path in paths {
        let rd = system.open(path, without_write, &ctx).unwrap();
        types.insert(system.stat(rd).unwrap().resource_type());
        let err = system.write(rd, "power", json!("on")).await.unwrap_err();
        assert!(matches!(err, RosixError::PermissionDenied(_)), "{path}: {err:?}");
    }
    assert_eq!(types.len(), 5);
    assert!(types.contains(&ResourceType::Actor));
    assert_eq!(things.update_count(), 0);
}

#[tokio::test]
async fn test_invoke_on_person_not_implemented() {
    let (system, things) = purifier_system().await;
    things.insert(Thing::new("bob", "Bob", "person").with_behavior("air_purifier"));
    system.sync_resources().await.unwrap();

    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system.open("/things/person/bob", OpenMode::INVOKE, &ctx).unwrap();
    let err = system
        .invoke(rd, "purify_air", params(json!({"air_quality": 150.0})))
        .await
        .unwrap_err();
    assert!(matches!(err, RosixError::NotImplemented(_)));
}

#[tokio::test]
async fn test_watch_sees_writes_and_invokes() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let watcher = system
        .open("/things/machine/purifier-1", OpenMode::WATCH, &ctx)
        .unwrap();
    let actor = system
        .open("/things/machine/purifier-1", OpenMode::WRITE | OpenMode::INVOKE, &ctx)
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    system
        .watch(watcher, &[EventType::FeatureUpdate, EventType::BehaviorInvoked], move |e| {
            let _ = tx.send(e);
        })
        .unwrap();

    system.write(actor, "power", json!("on")).await.unwrap();
    system
        .invoke(actor, "purify_air", params(json!({"air_quality": 150.0})))
        .await
        .unwrap();
    // Error events are filtered out by the subscription.
    let _ = system.invoke(actor, "purify_air", Params::new()).await;

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.event_type, EventType::FeatureUpdate);
    assert_eq!(first.resource, actor);
    assert_eq!(first.data["value"], "on");

    let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.event_type, EventType::BehaviorInvoked);
    assert_eq!(second.data["actor_id"], "air_purifier");

    system.close(watcher).unwrap();
    system.write(actor, "power", json!("off")).await.unwrap();
    // The watch task ends on close, dropping its sender.
    let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_rejected_write_restores_feature() {
    let (system, things) = purifier_system().await;
    // Registered directly, so the store has never heard of it.
    let stray = Thing::new("stray", "Stray", "machine").with_feature("power", "off");
    system
        .registry()
        .register(Arc::new(ThingAdapter::new(stray.into_shared())))
        .unwrap();

    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system
        .open("/things/machine/stray", OpenMode::READ | OpenMode::WRITE | OpenMode::WATCH, &ctx)
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    system
        .watch(rd, &[EventType::FeatureUpdate], move |e| {
            let _ = tx.send(e);
        })
        .unwrap();

    let err = system.write(rd, "power", json!("on")).await.unwrap_err();
    assert!(matches!(err, RosixError::NotFound(_)));
    assert_eq!(system.read(rd, "power").unwrap(), "off");

    let err = system.write(rd, "speed", json!(3)).await.unwrap_err();
    assert!(matches!(err, RosixError::NotFound(_)));
    assert!(matches!(system.read(rd, "speed"), Err(RosixError::NotFound(_))));

    assert_eq!(things.update_count(), 0);
    let quiet = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(quiet.is_err(), "no event expected, got {quiet:?}");
}

#[tokio::test]
async fn test_actor_watch_reports_state_changes() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system.open("/actors/air_purifier", OpenMode::WATCH, &ctx).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    system
        .watch(rd, &[EventType::StateChange], move |e| {
            let _ = tx.send(e);
        })
        .unwrap();

    system.manager().stop_actor("air_purifier").await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, EventType::StateChange);
    assert_eq!(event.resource, rd);
    assert_eq!(event.resource_id, "air_purifier");
    assert_eq!(event.data["state"], "stopped");
}

#[tokio::test]
async fn test_watch_requires_watch_bit() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system
        .open("/things/machine/purifier-1", OpenMode::READ, &ctx)
        .unwrap();
    let err = system.watch(rd, &[], |_| {}).unwrap_err();
    assert!(matches!(err, RosixError::PermissionDenied(_)));
    assert!(matches!(system.unwatch(rd), Err(RosixError::NotFound(_))));
}

#[tokio::test]
async fn test_context_deadline_cancels_operations() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context_with_deadline(
        "alice",
        "s1",
        Params::new(),
        Duration::from_millis(30),
    );
    let rd = system
        .open("/things/machine/purifier-1", OpenMode::READ, &ctx)
        .unwrap();
    assert!(system.read(rd, "power").is_ok());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(matches!(system.read(rd, "power"), Err(RosixError::Cancelled(_))));
    // Expiry does not close the descriptor.
    assert!(system.handle_info(rd).is_ok());
}

#[tokio::test]
async fn test_destroyed_context_fails_invoke() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let rd = system
        .open("/things/machine/purifier-1", OpenMode::INVOKE, &ctx)
        .unwrap();
    system.destroy_context(&ctx);

    let err = system
        .invoke(rd, "purify_air", params(json!({"air_quality": 150.0})))
        .await
        .unwrap_err();
    assert!(matches!(err, RosixError::Cancelled(_)));
}

#[tokio::test]
async fn test_find_and_list() {
    let (system, things) = purifier_system().await;
    things.insert(
        Thing::new("purifier-2", "Bedroom purifier", "machine").with_attribute("model", "AP-200"),
    );
    system.sync_resources().await.unwrap();

    assert_eq!(system.list("/things/machine").len(), 2);
    assert_eq!(system.list("/").len(), 3);

    let query = rosix::resource::Query::new()
        .of_type(ResourceType::Device)
        .attribute("model", "AP-200");
    let found = system.find(&query);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), "purifier-2");
}

#[tokio::test]
async fn test_extension_points_report_unsupported() {
    let (system, _) = purifier_system().await;
    let ctx = system.create_context("alice", "s1", Params::new());
    let a = system
        .open("/things/machine/purifier-1", OpenMode::ALL, &ctx)
        .unwrap();
    let b = system.open("/actors/air_purifier", OpenMode::ALL, &ctx).unwrap();

    for capability in [
        Capability::Link,
        Capability::Unlink,
        Capability::Relations,
        Capability::Pipe,
        Capability::Fork,
        Capability::Batch,
        Capability::Transaction,
    ] {
        assert!(!system.supports(capability));
    }

    let checks = [
        system.link(a, b, "controls").unwrap_err(),
        system.unlink(a, b, "controls").unwrap_err(),
        system.relations(a).unwrap_err(),
        system.pipe(a, b).unwrap_err(),
        system.fork(a).unwrap_err(),
        system.batch(&[]).await.unwrap_err(),
        system.transaction(&[]).await.unwrap_err(),
    ];
    for err in checks {
        assert!(matches!(err, RosixError::Unsupported(_)));
        assert_eq!(err.code() as u16, 501);
    }
    // The failed calls did not disturb the descriptors.
    assert_eq!(system.handle_count(), 2);
}
