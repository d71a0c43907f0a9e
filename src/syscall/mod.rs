//! # Syscall Layer
//!
//! [`System`] is the only sanctioned entry point for callers. It hands out
//! [`ResourceDescriptor`]s for registry paths and gates every later operation on
//! the [`OpenMode`] fixed at open time.
//!
//! ## Descriptor lifecycle
//!
//! ```text
//! Closed --open--> Opened --close--> Closed
//! ```
//!
//! Descriptors come from a monotonic counter and are never reused, so any
//! operation on a closed descriptor fails with [`RosixError::NotFound`].
//!
//! ## Dispatch
//!
//! `invoke` routes by resource type. Actor resources are called by id. Device
//! and object resources are routed to the actor of the first bound behavior that
//! declares the function. Every call goes through the actor's mailbox.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rosix::syscall::{OpenMode, System};
//! # async fn demo(system: System) -> rosix::Result<()> {
//! let ctx = system.create_context("alice", "session-1", Default::default());
//! let rd = system.open("/things/machine/p1", OpenMode::READ | OpenMode::INVOKE, &ctx)?;
//! let power = system.read(rd, "power")?;
//! system.close(rd)?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod handle;
pub mod watch;

pub use context::Context;
pub use handle::{HandleInfo, OpenMode, ResourceDescriptor, ResourceHandle};
pub use watch::{Event, EventType, WatchCallback};

use crate::actor::ActorManager;
use crate::error::{Capability, Result, RosixError};
use crate::model::Params;
use crate::provider::ThingStore;
use crate::resource::{
    ActorAdapter, Query, Registry, ResourcePath, ResourceType, SharedResource, ThingAdapter,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use watch::WatchEntry;

/// Tunables for the descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemOptions {
    /// The first descriptor handed out is `descriptor_base + 1`.
    pub descriptor_base: i64,
    /// Require [`OpenMode::READ`] for `read`.
    pub enforce_read_mode: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            descriptor_base: 1000,
            enforce_read_mode: true,
        }
    }
}

/// One step of a batch or transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Read {
        rd: ResourceDescriptor,
        key: String,
    },
    Write {
        rd: ResourceDescriptor,
        key: String,
        value: Value,
    },
    Invoke {
        rd: ResourceDescriptor,
        behavior: String,
        params: Params,
    },
}

/// Outcome of [`System::sync_resources`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub registered: usize,
    /// Already present in the registry.
    pub skipped: usize,
    pub failed: usize,
}

pub struct System {
    registry: Arc<Registry>,
    manager: Arc<ActorManager>,
    things: Option<Arc<dyn ThingStore>>,
    options: SystemOptions,
    next_rd: AtomicI64,
    handles: RwLock<HashMap<ResourceDescriptor, Arc<ResourceHandle>>>,
    watches: Mutex<HashMap<ResourceDescriptor, WatchEntry>>,
    contexts: RwLock<HashMap<String, Arc<Context>>>,
}

impl System {
    pub fn new(registry: Arc<Registry>, manager: Arc<ActorManager>) -> Self {
        let options = SystemOptions::default();
        Self {
            registry,
            manager,
            things: None,
            options,
            next_rd: AtomicI64::new(options.descriptor_base),
            handles: RwLock::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Persistence target for writes and source for [`System::sync_resources`].
    pub fn with_things(mut self, things: Arc<dyn ThingStore>) -> Self {
        self.things = Some(things);
        self
    }

    pub fn with_options(mut self, options: SystemOptions) -> Self {
        self.options = options;
        self.next_rd = AtomicI64::new(options.descriptor_base);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<ActorManager> {
        &self.manager
    }

    pub fn options(&self) -> SystemOptions {
        self.options
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    pub fn create_context(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        metadata: Params,
    ) -> Arc<Context> {
        self.track(Context::new(user_id, session_id, metadata))
    }

    /// Like [`System::create_context`], but operations fail once `timeout` elapses.
    pub fn create_context_with_deadline(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        metadata: Params,
        timeout: Duration,
    ) -> Arc<Context> {
        self.track(Context::new(user_id, session_id, metadata).with_deadline(timeout))
    }

    fn track(&self, context: Context) -> Arc<Context> {
        let context = Arc::new(context);
        self.contexts
            .write()
            .insert(context.id.clone(), context.clone());
        debug!(context_id = %context.id, user_id = %context.user_id, "Context created");
        context
    }

    /// Raises the cancellation signal. Handles opened under the context stay open.
    pub fn destroy_context(&self, context: &Context) {
        context.cancel();
        self.contexts.write().remove(&context.id);
        debug!(context_id = %context.id, "Context destroyed");
    }

    pub fn context_count(&self) -> usize {
        self.contexts.read().len()
    }

    // =========================================================================
    // Descriptors
    // =========================================================================

    #[instrument(skip(self, context), fields(context_id = %context.id))]
    pub fn open(
        &self,
        path: &str,
        mode: OpenMode,
        context: &Arc<Context>,
    ) -> Result<ResourceDescriptor> {
        context.check()?;
        let resource = self.registry.get_by_path(&ResourcePath::new(path))?;
        let rd = ResourceDescriptor::new(self.next_rd.fetch_add(1, Ordering::SeqCst) + 1);
        let handle = ResourceHandle::new(rd, resource, mode, context.clone());
        self.handles.write().insert(rd, Arc::new(handle));
        info!(%rd, %mode, "Resource opened");
        Ok(rd)
    }

    /// Cancels any watch on `rd`, then discards the handle.
    #[instrument(skip(self))]
    pub fn close(&self, rd: ResourceDescriptor) -> Result<()> {
        let mut handles = self.handles.write();
        if !handles.contains_key(&rd) {
            return Err(not_open(rd));
        }
        if let Some(entry) = self.watches.lock().remove(&rd) {
            entry.cancel();
        }
        handles.remove(&rd);
        info!(%rd, "Resource closed");
        Ok(())
    }

    /// Looks `key` up in the resource's features, then its attributes.
    #[instrument(skip(self))]
    pub fn read(&self, rd: ResourceDescriptor, key: &str) -> Result<Value> {
        let required = self.options.enforce_read_mode.then_some(OpenMode::READ);
        let handle = self.handle(rd, required)?;
        let resource = &handle.resource;
        resource
            .features()
            .remove(key)
            .or_else(|| resource.attributes().remove(key))
            .ok_or_else(|| RosixError::NotFound(format!("key {key} on {}", resource.path())))
    }

    /// Sets a feature on the backing thing and persists it.
    ///
    /// Only thing-backed resources accept writes; everything else fails with
    /// [`RosixError::NotImplemented`]. If the store rejects the update the
    /// previous value is restored and no event is emitted.
    #[instrument(skip(self, value))]
    pub async fn write(&self, rd: ResourceDescriptor, key: &str, value: Value) -> Result<()> {
        let handle = self.handle(rd, Some(OpenMode::WRITE))?;
        let thing = handle.resource.thing().ok_or_else(|| {
            RosixError::NotImplemented(format!(
                "write on {} resource {}",
                handle.resource.resource_type(),
                handle.resource.id()
            ))
        })?;

        let (previous, snapshot) = {
            let mut thing = thing.write();
            let previous = thing.features.get(key).cloned();
            thing.set_feature(key, value.clone());
            (previous, thing.clone())
        };
        if let Some(store) = &self.things {
            if let Err(e) = store.update_thing(&snapshot).await {
                let mut thing = thing.write();
                match previous {
                    Some(old) => thing.features.insert(key.to_string(), old),
                    None => thing.features.remove(key),
                };
                warn!(%rd, key, error = %e, "Write rolled back");
                return Err(e);
            }
        }
        debug!(%rd, key, "Feature written");

        let mut data = Params::new();
        data.insert("key".into(), json!(key));
        data.insert("value".into(), value);
        self.emit(&handle, EventType::FeatureUpdate, data);
        Ok(())
    }

    /// Invokes `behavior` on the resource and waits for the actor's reply.
    ///
    /// The call races the handle's context: if the context is cancelled first
    /// the caller gets [`RosixError::Cancelled`], though the actor may still
    /// finish the work.
    #[instrument(skip(self, params))]
    pub async fn invoke(
        &self,
        rd: ResourceDescriptor,
        behavior: &str,
        params: Params,
    ) -> Result<Params> {
        let handle = self.handle(rd, Some(OpenMode::INVOKE))?;
        let resource = &handle.resource;
        let actor_id = match resource.resource_type() {
            ResourceType::Actor => resource.id().to_string(),
            ResourceType::Device | ResourceType::Object => self
                .manager
                .resolve_binding(&resource.behavior_ids(), behavior)?,
            other => {
                return Err(RosixError::NotImplemented(format!(
                    "invoke on {other} resource {}",
                    resource.id()
                )))
            }
        };

        let outcome = tokio::select! {
            result = self.manager.call_function(&actor_id, behavior, params) => result,
            _ = handle.context.cancelled() => Err(RosixError::Cancelled(format!(
                "invoke of {behavior} on {rd}"
            ))),
        };

        let mut data = Params::new();
        data.insert("behavior".into(), json!(behavior));
        data.insert("actor_id".into(), json!(actor_id));
        match &outcome {
            Ok(result) => {
                info!(%rd, %actor_id, behavior, "Behavior invoked");
                data.insert("result".into(), Value::Object(result.clone()));
                self.emit(&handle, EventType::BehaviorInvoked, data);
            }
            Err(e) => {
                warn!(%rd, %actor_id, behavior, error = %e, "Invoke failed");
                data.insert("error".into(), json!(e.to_string()));
                data.insert("error_kind".into(), json!(e.kind()));
                self.emit(&handle, EventType::Error, data);
            }
        }
        outcome
    }

    // =========================================================================
    // Watches
    // =========================================================================

    /// Registers `callback` for events on the resource behind `rd`.
    ///
    /// An empty `events` slice subscribes to every event type. A second watch on
    /// the same descriptor replaces the first. Watches on actor resources also
    /// receive a `state_change` event for every actor state transition.
    #[instrument(skip(self, callback))]
    pub fn watch<F>(&self, rd: ResourceDescriptor, events: &[EventType], callback: F) -> Result<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let handle = self.handle(rd, Some(OpenMode::WATCH))?;
        let entry = WatchEntry::spawn(
            rd,
            handle.resource.id().to_string(),
            events.to_vec(),
            handle.resource.state_changes(),
            Arc::new(callback),
        )?;
        if let Some(previous) = self.watches.lock().insert(rd, entry) {
            previous.cancel();
        }
        debug!(%rd, "Watch registered");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn unwatch(&self, rd: ResourceDescriptor) -> Result<()> {
        let entry = self
            .watches
            .lock()
            .remove(&rd)
            .ok_or_else(|| RosixError::NotFound(format!("watch on {rd}")))?;
        entry.cancel();
        Ok(())
    }

    fn emit(&self, origin: &ResourceHandle, event_type: EventType, data: Params) {
        let event = Event {
            event_type,
            resource: origin.rd,
            resource_id: origin.resource.id().to_string(),
            timestamp: Utc::now(),
            data,
        };
        for entry in self.watches.lock().values() {
            if entry.resource_id == event.resource_id && entry.wants(event_type) {
                entry.deliver(event.clone());
            }
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    pub fn stat(&self, rd: ResourceDescriptor) -> Result<SharedResource> {
        Ok(self.handle(rd, None)?.resource.clone())
    }

    pub fn handle_info(&self, rd: ResourceDescriptor) -> Result<HandleInfo> {
        self.handles
            .read()
            .get(&rd)
            .map(|h| h.info())
            .ok_or_else(|| not_open(rd))
    }

    pub fn find(&self, query: &Query) -> Vec<SharedResource> {
        self.registry.query(query)
    }

    /// Resources whose path lies under `prefix`, in registration order.
    pub fn list(&self, prefix: &str) -> Vec<SharedResource> {
        self.registry
            .list()
            .into_iter()
            .filter(|r| r.path().is_under(prefix))
            .collect()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.read().len()
    }

    // =========================================================================
    // Extension points
    // =========================================================================

    /// Whether `capability` is provided. Nothing is, yet.
    pub fn supports(&self, _capability: Capability) -> bool {
        false
    }

    pub fn link(
        &self,
        _from: ResourceDescriptor,
        _to: ResourceDescriptor,
        _relation: &str,
    ) -> Result<()> {
        Err(RosixError::Unsupported(Capability::Link))
    }

    pub fn unlink(
        &self,
        _from: ResourceDescriptor,
        _to: ResourceDescriptor,
        _relation: &str,
    ) -> Result<()> {
        Err(RosixError::Unsupported(Capability::Unlink))
    }

    pub fn relations(&self, _rd: ResourceDescriptor) -> Result<Vec<ResourceDescriptor>> {
        Err(RosixError::Unsupported(Capability::Relations))
    }

    pub fn pipe(&self, _source: ResourceDescriptor, _sink: ResourceDescriptor) -> Result<()> {
        Err(RosixError::Unsupported(Capability::Pipe))
    }

    pub fn fork(&self, _rd: ResourceDescriptor) -> Result<ResourceDescriptor> {
        Err(RosixError::Unsupported(Capability::Fork))
    }

    pub async fn batch(&self, _operations: &[Operation]) -> Result<Vec<Result<Value>>> {
        Err(RosixError::Unsupported(Capability::Batch))
    }

    pub async fn transaction(&self, _operations: &[Operation]) -> Result<Vec<Value>> {
        Err(RosixError::Unsupported(Capability::Transaction))
    }

    // =========================================================================
    // Resource sync
    // =========================================================================

    /// Registers every thing from the thing store and every managed actor.
    ///
    /// Resources already in the registry are skipped. A resource that fails to
    /// register is logged and counted; only a failing thing store aborts.
    pub async fn sync_resources(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let mut resources: Vec<SharedResource> = Vec::new();
        if let Some(store) = &self.things {
            let catalog = self.manager.catalog();
            for thing in store.list_things().await? {
                resources.push(Arc::new(ThingAdapter::new(thing).with_catalog(catalog.clone())));
            }
        }
        for managed in self.manager.list_actors() {
            resources.push(Arc::new(ActorAdapter::new(managed)));
        }

        for resource in resources {
            let id = resource.id().to_string();
            match self.registry.register(resource) {
                Ok(()) => report.registered += 1,
                Err(RosixError::AlreadyExists(_)) => report.skipped += 1,
                Err(e) => {
                    warn!(resource_id = %id, error = %e, "Resource not registered");
                    report.failed += 1;
                }
            }
        }
        info!(
            registered = report.registered,
            skipped = report.skipped,
            failed = report.failed,
            "Resources synced"
        );
        Ok(report)
    }

    // Lookup, then mode, then context; a denied mode wins over a dead context.
    fn handle(
        &self,
        rd: ResourceDescriptor,
        required: Option<OpenMode>,
    ) -> Result<Arc<ResourceHandle>> {
        let handle = self
            .handles
            .read()
            .get(&rd)
            .cloned()
            .ok_or_else(|| not_open(rd))?;
        if let Some(required) = required {
            if !handle.mode.contains(required) {
                return Err(RosixError::PermissionDenied(format!(
                    "{rd} opened {} lacks {required}",
                    handle.mode
                )));
            }
        }
        handle.context.check()?;
        handle.touch();
        Ok(handle)
    }
}

fn not_open(rd: ResourceDescriptor) -> RosixError {
    RosixError::NotFound(format!("descriptor {rd}"))
}
