mod common;

use async_trait::async_trait;
use common::{params, purifier_behavior};
use rosix::actor::{
    Actor, ActorManager, ActorOptions, ActorState, Backpressure, FunctionTable, Message,
    MessageType, SYSTEM_SENDER,
};
use rosix::mock::MockTable;
use rosix::model::{Behavior, Function, Params};
use rosix::{Result, RosixError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// Holds every call until the test hands out permits, and reports when a call starts.
struct GatedTable {
    gate: Arc<Semaphore>,
    entered: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FunctionTable for GatedTable {
    fn functions(&self) -> Vec<String> {
        vec!["work".into()]
    }

    async fn call(&mut self, function: &str, _params: &Params) -> Result<Params> {
        let _ = self.entered.send(function.to_string());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| RosixError::Internal(e.to_string()))?;
        permit.forget();
        Ok(params(json!({"done": true})))
    }
}

fn gated(
    backpressure: Backpressure,
) -> (Actor, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
    let gate = Arc::new(Semaphore::new(0));
    let (entered, entered_rx) = mpsc::unbounded_channel();
    let options = ActorOptions {
        mailbox_capacity: 1,
        backpressure,
        ..ActorOptions::default()
    };
    let actor = Actor::new(
        "gated",
        "Gated",
        GatedTable {
            gate: gate.clone(),
            entered,
        },
        options,
    );
    actor.start().unwrap();
    (actor, gate, entered_rx)
}

fn work() -> Message {
    Message::function_call(SYSTEM_SENDER, "gated", "work", Params::new())
}

#[tokio::test]
async fn test_responses_follow_send_order() {
    let mock = MockTable::new(["step"]);
    for i in 0..3 {
        mock.expect_call("step").return_ok(params(json!({"i": i})));
    }
    let actor = Actor::new("seq", "Sequencer", mock.table(), ActorOptions::default());
    actor.start().unwrap();
    let mut log = actor.subscribe();

    let sent: Vec<Message> = (0..3)
        .map(|i| Message::function_call(SYSTEM_SENDER, "seq", "step", params(json!({"n": i}))))
        .collect();
    for message in &sent {
        actor.send(message.clone()).await.unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let response = tokio::time::timeout(Duration::from_secs(1), log.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.kind, MessageType::FunctionResponse);
        assert_eq!(response.to, SYSTEM_SENDER);
        assert!(response.is_success());
        seen.push(response.correlation_id);
    }

    let expected: Vec<String> = sent.iter().map(|m| m.correlation_id.clone()).collect();
    assert_eq!(seen, expected);
    let calls: Vec<_> = mock.calls().into_iter().map(|(_, p)| p["n"].clone()).collect();
    assert_eq!(calls, [json!(0), json!(1), json!(2)]);
    mock.verify();
    actor.stop().await.unwrap();
}

#[tokio::test]
async fn test_fail_fast_rejects_when_full() {
    let (actor, gate, mut entered) = gated(Backpressure::FailFast);

    actor.send(work()).await.unwrap();
    entered.recv().await.unwrap();
    // The loop is busy with the first call, so this one fills the mailbox.
    actor.send(work()).await.unwrap();

    let err = actor.send(work()).await.unwrap_err();
    assert!(matches!(err, RosixError::ResourceBusy(_)));
    assert_eq!(actor.status().queued, 1);

    gate.add_permits(2);
    entered.recv().await.unwrap();
    actor.stop().await.unwrap();
}

#[tokio::test]
async fn test_block_times_out_then_fails() {
    let (actor, gate, mut entered) = gated(Backpressure::Block { timeout_ms: 50 });

    actor.send(work()).await.unwrap();
    entered.recv().await.unwrap();
    actor.send(work()).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = actor.send(work()).await.unwrap_err();
    assert!(matches!(err, RosixError::ResourceBusy(_)));
    assert!(started.elapsed() >= Duration::from_millis(50));

    gate.add_permits(2);
    actor.stop().await.unwrap();
}

#[tokio::test]
async fn test_block_waits_for_room() {
    let (actor, gate, mut entered) = gated(Backpressure::Block { timeout_ms: 5_000 });

    actor.send(work()).await.unwrap();
    entered.recv().await.unwrap();
    actor.send(work()).await.unwrap();

    let blocked = {
        let actor = actor.clone();
        tokio::spawn(async move { actor.send(work()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    gate.add_permits(3);
    blocked.await.unwrap().unwrap();
    for _ in 0..2 {
        entered.recv().await.unwrap();
    }
    actor.stop().await.unwrap();
}

#[tokio::test]
async fn test_send_to_stopped_actor_fails() {
    let mock = MockTable::new(["noop"]);
    let actor = Actor::new("a", "A", mock.table(), ActorOptions::default());
    actor.start().unwrap();
    actor.stop().await.unwrap();

    let err = actor.call("noop", Params::new()).await.unwrap_err();
    assert!(matches!(err, RosixError::ActorUnavailable(_)));
    assert!(matches!(actor.start(), Err(RosixError::ResourceBusy(_))));
}

#[tokio::test]
async fn test_air_quality_schema() {
    let manager = ActorManager::new(ActorOptions::default());
    manager.create_actor_from_behavior(purifier_behavior()).unwrap();

    for bad in [json!({}), json!({"air_quality": "150"}), json!({"air_quality": 600})] {
        let err = manager
            .call_function("air_purifier", "purify_air", params(bad.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, RosixError::Validation(_)), "{bad} gave {err:?}");
    }

    let ok = manager
        .call_function("air_purifier", "purify_air", params(json!({"air_quality": 150.0})))
        .await
        .unwrap();
    assert_eq!(ok["current_quality"], 150.0);

    // Failed calls are responses, not crashes.
    assert_eq!(manager.actor_state("air_purifier").unwrap(), ActorState::Running);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_all_reports_every_failure() {
    let manager = ActorManager::new(ActorOptions::default());
    let behavior = |id: &str| Behavior::new(id, id).with_function(Function::new("boom"));

    // Neither mock has expectations, so the first call panics its actor loop.
    for id in ["first", "second"] {
        manager
            .create_actor_with_table(behavior(id), MockTable::new(["boom"]))
            .unwrap();
    }
    manager.create_actor_from_behavior(behavior("healthy")).unwrap();

    for id in ["first", "second"] {
        let err = manager
            .call_function(id, "boom", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RosixError::ActorUnavailable(_)));
        assert_eq!(manager.actor_state(id).unwrap(), ActorState::Error);
    }
    let health = manager.health_check();
    assert_eq!(health.error, 2);
    assert!(!health.is_healthy());

    match manager.stop_all().await {
        Err(RosixError::Shutdown { failures }) => {
            let ids: Vec<_> = failures.iter().map(|(id, _)| id.as_str()).collect();
            assert_eq!(ids, ["first", "second"]);
        }
        other => panic!("expected aggregated shutdown failure, got {other:?}"),
    }
    assert_eq!(manager.actor_count(), 0);
}

#[tokio::test]
async fn test_wire_call_names_function_in_payload() {
    let mock = MockTable::new(["ping"]);
    mock.expect_call("ping").return_ok(params(json!({"pong": true})));
    let actor = Actor::new("a", "A", mock.table(), ActorOptions::default());
    actor.start().unwrap();
    let mut log = actor.subscribe();

    let wire = r#"{
        "id": "m1",
        "timestamp": "2026-01-01T00:00:00Z",
        "correlation_id": "c1",
        "type": "function_call",
        "from": "client",
        "to": "a",
        "payload": {"function": "ping", "params": {"x": 1}}
    }"#;
    actor.send(Message::from_json(wire).unwrap()).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(1), log.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.kind, MessageType::FunctionResponse);
    assert_eq!(response.correlation_id, "c1");
    assert_eq!(response.to, "client");
    assert_eq!(response.function.as_deref(), Some("ping"));
    assert!(response.is_success(), "{:?}", response.payload);
    assert_eq!(response.payload["result"]["pong"], true);

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "ping");
    assert_eq!(calls[0].1, params(json!({"x": 1})));
    mock.verify();
    actor.stop().await.unwrap();
}

#[tokio::test]
async fn test_try_send_ignores_block_policy() {
    let (actor, gate, mut entered) = gated(Backpressure::Block { timeout_ms: 5_000 });

    actor.send(work()).await.unwrap();
    entered.recv().await.unwrap();
    actor.send(work()).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = actor.try_send(work()).unwrap_err();
    assert!(matches!(err, RosixError::ResourceBusy(_)));
    assert!(started.elapsed() < Duration::from_secs(1));

    gate.add_permits(2);
    actor.stop().await.unwrap();
}

#[tokio::test]
async fn test_full_mailbox_does_not_hold_up_heartbeats() {
    let options = ActorOptions {
        mailbox_capacity: 1,
        backpressure: Backpressure::Block { timeout_ms: 5_000 },
        ..ActorOptions::default()
    };
    let manager = ActorManager::new(options);
    let gate = Arc::new(Semaphore::new(0));
    let (entered, mut entered_rx) = mpsc::unbounded_channel();

    // Created first, so the heartbeat visits it before the fan.
    manager
        .create_actor_with_table(
            Behavior::new("gated", "Gated").with_function(Function::new("work")),
            GatedTable {
                gate: gate.clone(),
                entered,
            },
        )
        .unwrap();
    let fan = Behavior::new("fan", "Fan").with_function(Function::new("spin"));
    let fan = manager.create_actor_from_behavior(fan).unwrap();

    manager.send_message(work()).await.unwrap();
    entered_rx.recv().await.unwrap();
    manager.send_message(work()).await.unwrap();

    let before = fan.actor.status().last_active;
    manager.start_heartbeat(Duration::from_millis(10)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fan.actor.status().last_active > before);

    gate.add_permits(2);
    manager.shutdown().await.unwrap();
}
