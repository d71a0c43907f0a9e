//! # Actor Manager
//!
//! Supervises every actor in the process.
//!
//! - **Materialization**: one actor per behavior definition, keyed by behavior id.
//!   Creating an id that already exists returns the existing actor.
//! - **Binding table**: the [`BehaviorCatalog`] records which behavior provides which
//!   function. It is filled once as behaviors are registered and consulted by the
//!   syscall layer to route an invoke on a thing to the right actor.
//! - **Observability**: status, info, health and category/type lookups.
//! - **Heartbeat**: a periodic heartbeat fanned out to every running actor.
//! - **Shutdown**: stops every actor in creation order, collecting failures instead
//!   of stopping at the first one.

use super::actor::{Actor, ActorOptions, ActorState, ActorStatus, FunctionTable};
use super::executor::FunctionExecutor;
use super::message::Message;
use super::primitives::ActionTable;
use crate::error::{Result, RosixError};
use crate::model::{Behavior, Params};
use crate::provider::BehaviorStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sender name on manager-originated messages.
pub const MANAGER_SENDER: &str = "actor_manager";

// =============================================================================
// BINDING TABLE
// =============================================================================

/// Behavior id → definition, plus a function → providing-behaviors index.
#[derive(Debug, Default)]
pub struct BehaviorCatalog {
    inner: RwLock<CatalogInner>,
}

#[derive(Debug, Default)]
struct CatalogInner {
    behaviors: HashMap<String, Arc<Behavior>>,
    providers: HashMap<String, Vec<String>>,
}

impl BehaviorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a behavior and reindexes its functions.
    pub fn insert(&self, behavior: Arc<Behavior>) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.behaviors.remove(&behavior.id) {
            unindex(&mut inner.providers, &old);
        }
        for function in behavior.functions.keys() {
            inner
                .providers
                .entry(function.clone())
                .or_default()
                .push(behavior.id.clone());
        }
        inner.behaviors.insert(behavior.id.clone(), behavior);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Behavior>> {
        let mut inner = self.inner.write();
        let removed = inner.behaviors.remove(id)?;
        unindex(&mut inner.providers, &removed);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Behavior>> {
        self.inner.read().behaviors.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Function names offered by the given behaviors, in behavior order.
    pub fn functions_of(&self, behavior_ids: &[String]) -> Vec<String> {
        let inner = self.inner.read();
        behavior_ids
            .iter()
            .filter_map(|id| inner.behaviors.get(id))
            .flat_map(|b| b.functions.keys().cloned())
            .collect()
    }

    /// The first of `behavior_ids` that provides `function`.
    pub fn provider_of(&self, behavior_ids: &[String], function: &str) -> Option<String> {
        let inner = self.inner.read();
        let providers = inner.providers.get(function)?;
        behavior_ids
            .iter()
            .find(|id| providers.contains(id))
            .cloned()
    }
}

fn unindex(providers: &mut HashMap<String, Vec<String>>, behavior: &Behavior) {
    for function in behavior.functions.keys() {
        if let Some(ids) = providers.get_mut(function) {
            ids.retain(|id| id != &behavior.id);
            if ids.is_empty() {
                providers.remove(function);
            }
        }
    }
}

// =============================================================================
// MANAGED ACTORS
// =============================================================================

/// An actor together with the behavior it was built from.
#[derive(Debug, Clone)]
pub struct ManagedActor {
    pub actor: Actor,
    pub behavior: Arc<Behavior>,
}

impl ManagedActor {
    pub fn id(&self) -> &str {
        self.actor.id()
    }

    pub fn info(&self) -> ActorInfo {
        let status = self.actor.status();
        ActorInfo {
            id: status.id,
            name: status.name,
            category: self.behavior.category.clone(),
            behavior_type: self.behavior.behavior_type.clone(),
            description: self.behavior.description.clone(),
            state: status.state,
            last_active: status.last_active,
            functions: status.functions,
            processed: status.processed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorInfo {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "type")]
    pub behavior_type: String,
    pub description: String,
    pub state: ActorState,
    pub last_active: DateTime<Utc>,
    pub functions: Vec<String>,
    pub processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub total: usize,
    pub running: usize,
    pub idle: usize,
    pub stopped: usize,
    pub error: usize,
    /// Ids of actors that are not running.
    pub unhealthy: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }
}

#[derive(Default)]
struct Actors {
    by_id: HashMap<String, ManagedActor>,
    order: Vec<String>,
}

impl Actors {
    fn ordered(&self) -> Vec<ManagedActor> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }
}

struct Heartbeat {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct ActorManager {
    actors: Arc<RwLock<Actors>>,
    catalog: Arc<BehaviorCatalog>,
    actions: Arc<ActionTable>,
    store: Option<Arc<dyn BehaviorStore>>,
    options: ActorOptions,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl ActorManager {
    pub fn new(options: ActorOptions) -> Self {
        Self {
            actors: Arc::new(RwLock::new(Actors::default())),
            catalog: Arc::new(BehaviorCatalog::new()),
            actions: Arc::new(ActionTable::builtin()),
            store: None,
            options,
            heartbeat: Mutex::new(None),
        }
    }

    /// Source for [`ActorManager::create_actor`].
    pub fn with_store(mut self, store: Arc<dyn BehaviorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the built-in primitive table.
    pub fn with_actions(mut self, actions: ActionTable) -> Self {
        self.actions = Arc::new(actions);
        self
    }

    pub fn catalog(&self) -> Arc<BehaviorCatalog> {
        self.catalog.clone()
    }

    pub fn options(&self) -> ActorOptions {
        self.options
    }

    // --- Creation -----------------------------------------------------------

    /// Creates the actor for a behavior fetched from the configured store.
    pub async fn create_actor(&self, behavior_id: &str) -> Result<ManagedActor> {
        if let Some(existing) = self.actors.read().by_id.get(behavior_id) {
            return Ok(existing.clone());
        }
        let store = self.store.as_ref().ok_or_else(|| {
            RosixError::Configuration("actor manager has no behavior store".into())
        })?;
        let behavior = store.get_behavior(behavior_id).await?;
        self.create_actor_from_behavior(behavior)
    }

    /// Creates and starts the actor for `behavior`, or returns the existing one.
    pub fn create_actor_from_behavior(&self, behavior: Behavior) -> Result<ManagedActor> {
        if let Some(existing) = self.existing(&behavior.id) {
            return Ok(existing);
        }
        let behavior = Arc::new(behavior);
        let executor = FunctionExecutor::new(behavior.clone(), self.actions.clone());
        self.install(behavior, executor)
    }

    /// Like [`ActorManager::create_actor_from_behavior`], but calls are served by
    /// `table` instead of the behavior's step lists. `behavior` still supplies the
    /// actor's identity and the function names used for routing.
    pub fn create_actor_with_table(
        &self,
        behavior: Behavior,
        table: impl FunctionTable,
    ) -> Result<ManagedActor> {
        if let Some(existing) = self.existing(&behavior.id) {
            return Ok(existing);
        }
        self.install(Arc::new(behavior), table)
    }

    fn existing(&self, id: &str) -> Option<ManagedActor> {
        let existing = self.actors.read().by_id.get(id).cloned();
        if existing.is_some() {
            debug!(actor_id = %id, "Actor already exists");
        }
        existing
    }

    fn install(&self, behavior: Arc<Behavior>, table: impl FunctionTable) -> Result<ManagedActor> {
        let actor = Actor::new(&behavior.id, &behavior.name, table, self.options);
        let managed = ManagedActor {
            actor,
            behavior: behavior.clone(),
        };

        {
            let mut actors = self.actors.write();
            if let Some(existing) = actors.by_id.get(&behavior.id) {
                return Ok(existing.clone());
            }
            actors.by_id.insert(behavior.id.clone(), managed.clone());
            actors.order.push(behavior.id.clone());
        }
        self.catalog.insert(behavior.clone());

        if let Err(e) = managed.actor.start() {
            self.forget(&behavior.id);
            return Err(e);
        }
        info!(
            actor_id = %behavior.id,
            category = %behavior.category,
            functions = behavior.functions.len(),
            "Actor created"
        );
        Ok(managed)
    }

    /// Creates an actor for every behavior in `store`. Individual failures are
    /// logged and skipped. Returns the number of actors now managed.
    pub async fn register_behaviors(&self, store: &dyn BehaviorStore) -> Result<usize> {
        let behaviors = store.list_behaviors().await?;
        let total = behaviors.len();
        for behavior in behaviors {
            let id = behavior.id.clone();
            if let Err(e) = self.create_actor_from_behavior(behavior) {
                warn!(actor_id = %id, error = %e, "Failed to create actor");
            }
        }
        let count = self.actor_count();
        info!(behaviors = total, actors = count, "Behaviors registered");
        Ok(count)
    }

    // --- Lookup -------------------------------------------------------------

    pub fn get_actor(&self, id: &str) -> Result<ManagedActor> {
        self.actors
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RosixError::NotFound(format!("actor {id}")))
    }

    /// All actors in creation order.
    pub fn list_actors(&self) -> Vec<ManagedActor> {
        self.actors.read().ordered()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.read().by_id.len()
    }

    pub fn actors_by_category(&self, category: &str) -> Vec<ManagedActor> {
        self.list_actors()
            .into_iter()
            .filter(|a| a.behavior.category == category)
            .collect()
    }

    pub fn actors_by_type(&self, behavior_type: &str) -> Vec<ManagedActor> {
        self.list_actors()
            .into_iter()
            .filter(|a| a.behavior.behavior_type == behavior_type)
            .collect()
    }

    /// The actor that serves `function` for a resource bound to `behavior_ids`.
    pub fn resolve_binding(&self, behavior_ids: &[String], function: &str) -> Result<String> {
        self.catalog
            .provider_of(behavior_ids, function)
            .ok_or_else(|| RosixError::NotFound(format!("behavior {function} not found")))
    }

    // --- Messaging ----------------------------------------------------------

    pub async fn send_message(&self, message: Message) -> Result<()> {
        let actor = self.get_actor(&message.to)?;
        actor.actor.send(message).await
    }

    pub async fn call_function(
        &self,
        actor_id: &str,
        function: &str,
        params: Params,
    ) -> Result<Params> {
        let managed = self.get_actor(actor_id)?;
        if !managed.behavior.functions.contains_key(function) {
            return Err(RosixError::NotFound(format!(
                "function {function} on actor {actor_id}"
            )));
        }
        managed.actor.call(function, params).await
    }

    /// Sends a copy of `message` to every running actor. Returns how many accepted it.
    pub async fn broadcast(&self, message: Message) -> usize {
        let mut delivered = 0;
        for managed in self.list_actors() {
            if managed.actor.state() != ActorState::Running {
                continue;
            }
            let mut copy = Message::new(message.kind, &message.from, managed.id());
            copy.function = message.function.clone();
            copy.payload = message.payload.clone();
            copy.correlation_id = message.correlation_id.clone();
            match managed.actor.send(copy).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(actor_id = %managed.id(), error = %e, "Broadcast not delivered"),
            }
        }
        delivered
    }

    // --- Status -------------------------------------------------------------

    pub fn actor_state(&self, id: &str) -> Result<ActorState> {
        Ok(self.get_actor(id)?.actor.state())
    }

    /// Status as seen by the actor's own loop, after everything already queued.
    pub async fn actor_status(&self, id: &str) -> Result<ActorStatus> {
        let managed = self.get_actor(id)?;
        if managed.actor.state() == ActorState::Running {
            managed.actor.query_status().await
        } else {
            Ok(managed.actor.status())
        }
    }

    pub fn actor_info(&self, id: &str) -> Result<ActorInfo> {
        Ok(self.get_actor(id)?.info())
    }

    pub fn all_statuses(&self) -> Vec<ActorStatus> {
        self.list_actors().iter().map(|a| a.actor.status()).collect()
    }

    pub fn health_check(&self) -> HealthReport {
        let mut report = HealthReport {
            total: 0,
            running: 0,
            idle: 0,
            stopped: 0,
            error: 0,
            unhealthy: Vec::new(),
            checked_at: Utc::now(),
        };
        for managed in self.list_actors() {
            report.total += 1;
            let state = managed.actor.state();
            match state {
                ActorState::Running => report.running += 1,
                ActorState::Idle => report.idle += 1,
                ActorState::Stopped => report.stopped += 1,
                ActorState::Error => report.error += 1,
            }
            if state != ActorState::Running {
                report.unhealthy.push(managed.id().to_string());
            }
        }
        report
    }

    // --- Heartbeat ----------------------------------------------------------

    /// Starts (or restarts) the periodic heartbeat. A zero interval disables it.
    ///
    /// Beats never wait for mailbox room: an actor with a full mailbox misses
    /// the beat and the rest still get theirs.
    pub fn start_heartbeat(&self, interval: Duration) -> Result<()> {
        self.stop_heartbeat();
        if interval.is_zero() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            RosixError::Internal(format!("heartbeat needs a Tokio runtime: {e}"))
        })?;

        let (stop, mut stop_rx) = watch::channel(false);
        let actors = self.actors.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let targets = actors.read().ordered();
                        for managed in targets {
                            if managed.actor.state() != ActorState::Running {
                                continue;
                            }
                            let beat = Message::heartbeat(MANAGER_SENDER, managed.id());
                            match managed.actor.try_send(beat) {
                                Ok(()) => {}
                                Err(RosixError::ResourceBusy(_)) => {
                                    warn!(
                                        actor_id = %managed.id(),
                                        "Heartbeat skipped, mailbox full"
                                    );
                                }
                                Err(e) => {
                                    debug!(
                                        actor_id = %managed.id(),
                                        error = %e,
                                        "Heartbeat not delivered"
                                    );
                                }
                            }
                        }
                    }
                }
            }
            debug!("Heartbeat stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "Heartbeat started");
        *self.heartbeat.lock() = Some(Heartbeat { stop, handle });
        Ok(())
    }

    fn stop_heartbeat(&self) -> Option<JoinHandle<()>> {
        let heartbeat = self.heartbeat.lock().take()?;
        let _ = heartbeat.stop.send(true);
        Some(heartbeat.handle)
    }

    // --- Shutdown -----------------------------------------------------------

    /// Stops one actor and forgets it.
    pub async fn stop_actor(&self, id: &str) -> Result<()> {
        let managed = self.get_actor(id)?;
        self.forget(id);
        managed.actor.stop().await
    }

    /// Stops every actor in creation order. All actors are attempted; failures
    /// are reported together.
    pub async fn stop_all(&self) -> Result<()> {
        let actors = {
            let mut actors = self.actors.write();
            let ordered = actors.ordered();
            actors.by_id.clear();
            actors.order.clear();
            ordered
        };

        let mut failures = Vec::new();
        for managed in actors {
            self.catalog.remove(managed.id());
            if let Err(e) = managed.actor.stop().await {
                warn!(actor_id = %managed.id(), error = %e, "Actor failed to stop");
                failures.push((managed.id().to_string(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RosixError::Shutdown { failures })
        }
    }

    /// Stops the heartbeat, then every actor.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.stop_heartbeat() {
            let _ = handle.await;
        }
        let result = self.stop_all().await;
        info!(ok = result.is_ok(), "Actor manager shut down");
        result
    }

    fn forget(&self, id: &str) {
        let mut actors = self.actors.write();
        actors.by_id.remove(id);
        actors.order.retain(|other| other != id);
        drop(actors);
        self.catalog.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Function, ImplementationStep};
    use serde_json::json;

    fn behavior(id: &str, category: &str, functions: &[&str]) -> Behavior {
        functions.iter().fold(
            Behavior::new(id, id.to_uppercase())
                .with_category(category)
                .with_type("device_control"),
            |b, f| b.with_function(Function::new(*f).step(ImplementationStep::new(1, "start_fan"))),
        )
    }

    #[test]
    fn test_catalog_resolves_first_provider() {
        let catalog = BehaviorCatalog::new();
        catalog.insert(Arc::new(behavior("fan", "device", &["spin", "stop"])));
        catalog.insert(Arc::new(behavior("purifier", "device", &["spin", "purify"])));

        let ids = vec!["purifier".to_string(), "fan".to_string()];
        assert_eq!(catalog.provider_of(&ids, "spin").as_deref(), Some("purifier"));
        assert_eq!(catalog.provider_of(&ids, "stop").as_deref(), Some("fan"));
        assert_eq!(catalog.provider_of(&ids[1..], "purify"), None);

        catalog.remove("purifier");
        assert_eq!(catalog.provider_of(&ids, "spin").as_deref(), Some("fan"));
        assert_eq!(catalog.functions_of(&ids), ["spin", "stop"]);
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let manager = ActorManager::new(ActorOptions::default());
        let a = manager
            .create_actor_from_behavior(behavior("fan", "device", &["spin"]))
            .unwrap();
        let b = manager
            .create_actor_from_behavior(behavior("fan", "other", &["other"]))
            .unwrap();
        assert_eq!(manager.actor_count(), 1);
        assert_eq!(b.behavior.category, "device");
        assert_eq!(a.actor.state(), ActorState::Running);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lookups_and_calls() {
        let manager = ActorManager::new(ActorOptions::default());
        manager
            .create_actor_from_behavior(behavior("fan", "device", &["spin"]))
            .unwrap();
        manager
            .create_actor_from_behavior(behavior("auth", "person", &["login"]))
            .unwrap();

        assert_eq!(manager.actors_by_category("device").len(), 1);
        assert_eq!(manager.actors_by_type("device_control").len(), 2);
        let ids: Vec<_> = manager.list_actors().iter().map(|a| a.id().to_string()).collect();
        assert_eq!(ids, ["fan", "auth"]);

        let out = manager.call_function("fan", "spin", Params::new()).await.unwrap();
        assert_eq!(out["fan_started"], json!(true));
        assert!(matches!(
            manager.call_function("fan", "login", Params::new()).await,
            Err(RosixError::NotFound(_))
        ));
        assert!(matches!(
            manager.call_function("ghost", "spin", Params::new()).await,
            Err(RosixError::NotFound(_))
        ));

        let info = manager.actor_info("auth").unwrap();
        assert_eq!(info.category, "person");
        assert_eq!(info.functions, ["login"]);

        let health = manager.health_check();
        assert_eq!(health.running, 2);
        assert!(health.is_healthy());

        manager.shutdown().await.unwrap();
        assert_eq!(manager.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_actor_removes_binding() {
        let manager = ActorManager::new(ActorOptions::default());
        let fan = manager
            .create_actor_from_behavior(behavior("fan", "device", &["spin"]))
            .unwrap();
        manager.stop_actor("fan").await.unwrap();

        assert_eq!(fan.actor.state(), ActorState::Stopped);
        assert!(manager.get_actor("fan").is_err());
        assert!(manager
            .resolve_binding(&["fan".to_string()], "spin")
            .is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_running_actors() {
        let manager = ActorManager::new(ActorOptions::default());
        for id in ["a", "b", "c"] {
            manager
                .create_actor_from_behavior(behavior(id, "device", &["spin"]))
                .unwrap();
        }
        manager.get_actor("b").unwrap().actor.stop().await.unwrap();

        let delivered = manager
            .broadcast(Message::heartbeat(MANAGER_SENDER, "*"))
            .await;
        assert_eq!(delivered, 2);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_touches_actors() {
        let manager = ActorManager::new(ActorOptions::default());
        let fan = manager
            .create_actor_from_behavior(behavior("fan", "device", &["spin"]))
            .unwrap();
        let before = fan.actor.status().last_active;

        manager.start_heartbeat(Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let status = fan.actor.status();

        assert!(status.last_active > before);
        // Heartbeats are not counted as processed work.
        assert_eq!(status.processed, 0);
        manager.shutdown().await.unwrap();
    }
}
