//! Descriptor watches.
//!
//! Each watch owns a small task that feeds events to its callback, so a slow
//! callback delays only its own watch. Cancelling the watch (unwatch or close)
//! stops the task; events still queued are dropped.
//!
//! A watch on an actor resource also follows the actor's state and reports each
//! transition as a `state_change` event.

use super::handle::ResourceDescriptor;
use crate::actor::ActorState;
use crate::error::{Result, RosixError};
use crate::model::Params;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChange,
    FeatureUpdate,
    BehaviorInvoked,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Descriptor the triggering operation went through. State changes carry the
    /// watching descriptor.
    pub resource: ResourceDescriptor,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Params,
}

pub type WatchCallback = Arc<dyn Fn(Event) + Send + Sync>;

pub(crate) struct WatchEntry {
    pub resource_id: String,
    events: Vec<EventType>,
    sender: mpsc::UnboundedSender<Event>,
    cancel: watch::Sender<bool>,
}

impl WatchEntry {
    /// Spawns the delivery task. An empty `events` list subscribes to everything.
    ///
    /// `states` feeds `state_change` events; it is ignored when the watch does not
    /// subscribe to them. Fails outside a Tokio runtime.
    pub fn spawn(
        rd: ResourceDescriptor,
        resource_id: String,
        events: Vec<EventType>,
        states: Option<watch::Receiver<ActorState>>,
        callback: WatchCallback,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            RosixError::Internal(format!("watch on {rd} needs a Tokio runtime: {e}"))
        })?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();
        let (cancel, mut cancelled) = watch::channel(false);
        let entry = Self {
            resource_id,
            events,
            sender,
            cancel,
        };
        let mut states = states.filter(|_| entry.wants(EventType::StateChange));
        let actor_id = entry.resource_id.clone();

        runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    event = receiver.recv() => match event {
                        Some(event) => callback(event),
                        None => break,
                    },
                    state = next_state(&mut states) => {
                        callback(state_change(rd, &actor_id, state));
                    }
                }
            }
            debug!(%rd, "Watch ended");
        });
        Ok(entry)
    }

    pub fn wants(&self, event_type: EventType) -> bool {
        self.events.is_empty() || self.events.contains(&event_type)
    }

    pub fn deliver(&self, event: Event) {
        // A closed channel means the watch is being torn down.
        let _ = self.sender.send(event);
    }

    /// Stops the delivery task. Queued events are dropped.
    pub fn cancel(self) {
        let _ = self.cancel.send(true);
    }
}

/// Waits for the next actor transition. Never resolves without a live receiver.
async fn next_state(states: &mut Option<watch::Receiver<ActorState>>) -> ActorState {
    if let Some(receiver) = states.as_mut() {
        if receiver.changed().await.is_ok() {
            return *receiver.borrow_and_update();
        }
        // The actor is gone; no more transitions will come.
        *states = None;
    }
    std::future::pending().await
}

fn state_change(rd: ResourceDescriptor, actor_id: &str, state: ActorState) -> Event {
    let mut data = Params::new();
    data.insert("actor_id".into(), json!(actor_id));
    data.insert("state".into(), json!(state));
    Event {
        event_type: EventType::StateChange,
        resource: rd,
        resource_id: actor_id.to_string(),
        timestamp: Utc::now(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = WatchEntry::spawn(
            ResourceDescriptor::new(1001),
            "p1".into(),
            Vec::new(),
            None,
            Arc::new(|_: Event| {}),
        );
        assert!(matches!(result, Err(RosixError::Internal(_))));
    }

    #[tokio::test]
    async fn test_state_changes_follow_the_filter() {
        let (states, _) = watch::channel(ActorState::Idle);
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let entry = WatchEntry::spawn(
            ResourceDescriptor::new(1001),
            "fan".into(),
            vec![EventType::FeatureUpdate],
            Some(states.subscribe()),
            Arc::new(move |e: Event| {
                let _ = tx.send(e);
            }),
        )
        .unwrap();

        states.send_replace(ActorState::Running);
        let quiet = tokio::time::timeout(std::time::Duration::from_millis(30), rx.recv()).await;
        assert!(quiet.is_err());
        entry.cancel();
    }
}
