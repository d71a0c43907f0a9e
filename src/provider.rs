//! # Providers
//!
//! The runtime does not own storage. Behavior definitions and thing records are
//! fetched from two collaborators through fetch-by-id / fetch-all operations:
//!
//! - [`BehaviorStore`]: supplies behavior definitions to materialize actors.
//! - [`ThingStore`]: supplies thing records to adapt into resources, and receives
//!   feature writes made through the syscall layer.
//!
//! Both traits are `#[async_trait]` so a database-backed implementation can live
//! outside this crate. The in-memory versions here back the demo and the tests.

use crate::error::{Result, RosixError};
use crate::model::{Behavior, SharedThing, Thing};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

#[async_trait]
pub trait BehaviorStore: Send + Sync {
    async fn get_behavior(&self, id: &str) -> Result<Behavior>;
    async fn list_behaviors(&self) -> Result<Vec<Behavior>>;
}

#[async_trait]
pub trait ThingStore: Send + Sync {
    /// Returns the live, shared record. Adapters keep this reference.
    async fn get_thing(&self, id: &str) -> Result<SharedThing>;
    async fn list_things(&self) -> Result<Vec<SharedThing>>;
    /// Persists the current state of a thing after a write.
    async fn update_thing(&self, thing: &Thing) -> Result<()>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// Behavior definitions held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryBehaviorStore {
    behaviors: RwLock<Vec<Behavior>>,
}

impl InMemoryBehaviorStore {
    pub fn new(behaviors: impl IntoIterator<Item = Behavior>) -> Self {
        Self {
            behaviors: RwLock::new(behaviors.into_iter().collect()),
        }
    }

    /// Inserts or replaces a behavior by id.
    pub fn put(&self, behavior: Behavior) {
        let mut behaviors = self.behaviors.write();
        match behaviors.iter_mut().find(|b| b.id == behavior.id) {
            Some(existing) => *existing = behavior,
            None => behaviors.push(behavior),
        }
    }
}

#[async_trait]
impl BehaviorStore for InMemoryBehaviorStore {
    async fn get_behavior(&self, id: &str) -> Result<Behavior> {
        self.behaviors
            .read()
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| RosixError::NotFound(format!("behavior {id}")))
    }

    async fn list_behaviors(&self) -> Result<Vec<Behavior>> {
        Ok(self.behaviors.read().clone())
    }
}

/// Thing records held in memory.
///
/// `update_thing` does not copy anything (the records are already shared) but
/// counts calls so tests can observe that a write reached the store.
#[derive(Default)]
pub struct InMemoryThingStore {
    things: RwLock<Vec<SharedThing>>,
    index: RwLock<HashMap<String, SharedThing>>,
    updates: AtomicUsize,
}

impl InMemoryThingStore {
    pub fn new(things: impl IntoIterator<Item = Thing>) -> Self {
        let store = Self::default();
        for thing in things {
            store.insert(thing);
        }
        store
    }

    pub fn insert(&self, thing: Thing) -> SharedThing {
        let id = thing.id.clone();
        let shared = thing.into_shared();
        self.things.write().push(shared.clone());
        self.index.write().insert(id, shared.clone());
        shared
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThingStore for InMemoryThingStore {
    async fn get_thing(&self, id: &str) -> Result<SharedThing> {
        self.index
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RosixError::NotFound(format!("thing {id}")))
    }

    async fn list_things(&self) -> Result<Vec<SharedThing>> {
        Ok(self.things.read().clone())
    }

    async fn update_thing(&self, thing: &Thing) -> Result<()> {
        if !self.index.read().contains_key(&thing.id) {
            return Err(RosixError::NotFound(format!("thing {}", thing.id)));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        debug!(thing_id = %thing.id, "Thing persisted");
        Ok(())
    }
}
