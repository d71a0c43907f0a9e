//! # Resource Registry
//!
//! Catalogue of live resources, indexed three ways:
//!
//! - **by id**: the owning index, holding the resource itself.
//! - **by path**: path → id. A path resolves to exactly one id at any instant.
//! - **by type**: type → ids, in registration order.
//!
//! All three indices sit behind a single `RwLock`, so a register or unregister
//! updates them as one critical section and a reader never sees a resource in one
//! index but not another.
//!
//! Watchers registered with [`Registry::watch`] are told about every register and
//! unregister. Notification runs on a spawned task after the lock is released;
//! outside a Tokio runtime it runs inline.

use super::{Query, Resource, ResourcePath, ResourceType, SharedResource};
use crate::error::{Result, RosixError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAction {
    Register,
    Unregister,
}

#[derive(Clone)]
pub struct RegistryEvent {
    pub action: RegistryAction,
    pub resource: SharedResource,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Debug for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEvent")
            .field("action", &self.action)
            .field("resource", &self.resource.id())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Handle returned by [`Registry::watch`], used to unwatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

type Watcher = Arc<dyn Fn(RegistryEvent) + Send + Sync>;

struct Entry {
    resource: SharedResource,
    resource_type: ResourceType,
    seq: u64,
}

#[derive(Default)]
struct Indices {
    by_id: HashMap<String, Entry>,
    by_path: HashMap<ResourcePath, String>,
    by_type: HashMap<ResourceType, Vec<String>>,
    /// Registration sequence → id, for insertion-ordered listing.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Indices {
    fn is_consistent(&self) -> bool {
        let typed: usize = self.by_type.values().map(Vec::len).sum();
        self.by_id.len() == self.by_path.len()
            && self.by_id.len() == self.order.len()
            && self.by_id.len() == typed
            && self.by_id.iter().all(|(id, entry)| {
                self.by_path.get(entry.resource.path()) == Some(id)
                    && self.order.get(&entry.seq) == Some(id)
                    && self
                        .by_type
                        .get(&entry.resource_type)
                        .is_some_and(|ids| ids.contains(id))
            })
    }
}

#[derive(Default)]
pub struct Registry {
    indices: RwLock<Indices>,
    watchers: RwLock<Vec<(WatchId, Watcher)>>,
    next_watch: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource. Fails if its id or its path is already taken.
    pub fn register(&self, resource: SharedResource) -> Result<()> {
        let id = resource.id().to_string();
        let path = resource.path().clone();
        let resource_type = resource.resource_type();
        {
            let mut indices = self.indices.write();
            if indices.by_id.contains_key(&id) {
                return Err(RosixError::AlreadyExists(format!("resource {id}")));
            }
            if let Some(owner) = indices.by_path.get(&path) {
                return Err(RosixError::AlreadyExists(format!(
                    "path {path} is held by resource {owner}"
                )));
            }

            let seq = indices.next_seq;
            indices.next_seq += 1;
            indices.by_path.insert(path.clone(), id.clone());
            indices
                .by_type
                .entry(resource_type)
                .or_default()
                .push(id.clone());
            indices.order.insert(seq, id.clone());
            indices.by_id.insert(
                id.clone(),
                Entry {
                    resource: resource.clone(),
                    resource_type,
                    seq,
                },
            );
            debug_assert!(indices.is_consistent());
        }

        info!(resource_id = %id, %path, %resource_type, "Resource registered");
        self.notify(RegistryAction::Register, resource);
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Result<()> {
        let resource = {
            let mut indices = self.indices.write();
            let entry = indices
                .by_id
                .remove(id)
                .ok_or_else(|| RosixError::NotFound(format!("resource {id}")))?;
            indices.by_path.remove(entry.resource.path());
            indices.order.remove(&entry.seq);
            if let Some(ids) = indices.by_type.get_mut(&entry.resource_type) {
                ids.retain(|other| other != id);
                if ids.is_empty() {
                    indices.by_type.remove(&entry.resource_type);
                }
            }
            debug_assert!(indices.is_consistent());
            entry.resource
        };

        info!(resource_id = %id, "Resource unregistered");
        self.notify(RegistryAction::Unregister, resource);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<SharedResource> {
        self.indices
            .read()
            .by_id
            .get(id)
            .map(|e| e.resource.clone())
            .ok_or_else(|| RosixError::NotFound(format!("resource {id}")))
    }

    pub fn get_by_path(&self, path: &ResourcePath) -> Result<SharedResource> {
        let indices = self.indices.read();
        indices
            .by_path
            .get(path)
            .and_then(|id| indices.by_id.get(id))
            .map(|e| e.resource.clone())
            .ok_or_else(|| RosixError::NotFound(format!("resource at path {path}")))
    }

    /// Matching resources in registration order, after `offset`, at most `limit`.
    pub fn query(&self, query: &Query) -> Vec<SharedResource> {
        let candidates = self.candidates(query.resource_type);
        let matching = candidates
            .into_iter()
            .filter(|r| query.matches(r.as_ref()))
            .skip(query.offset);
        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Every resource, in registration order.
    pub fn list(&self) -> Vec<SharedResource> {
        self.candidates(None)
    }

    pub fn count(&self) -> usize {
        self.indices.read().by_id.len()
    }

    pub fn count_by_type(&self, resource_type: ResourceType) -> usize {
        self.indices
            .read()
            .by_type
            .get(&resource_type)
            .map_or(0, Vec::len)
    }

    /// Verifies that the three indices agree.
    pub fn is_consistent(&self) -> bool {
        self.indices.read().is_consistent()
    }

    /// Registers a change observer.
    pub fn watch<F>(&self, callback: F) -> WatchId
    where
        F: Fn(RegistryEvent) + Send + Sync + 'static,
    {
        let id = WatchId(self.next_watch.fetch_add(1, Ordering::SeqCst));
        self.watchers.write().push((id, Arc::new(callback)));
        debug!(watch_id = id.0, "Registry watcher added");
        id
    }

    pub fn unwatch(&self, id: WatchId) -> Result<()> {
        let mut watchers = self.watchers.write();
        let before = watchers.len();
        watchers.retain(|(other, _)| *other != id);
        if watchers.len() == before {
            return Err(RosixError::NotFound(format!("registry watch {}", id.0)));
        }
        Ok(())
    }

    // Snapshot under the read lock; resources are projected after it is released.
    fn candidates(&self, resource_type: Option<ResourceType>) -> Vec<SharedResource> {
        let indices = self.indices.read();
        match resource_type {
            Some(t) => indices
                .by_type
                .get(&t)
                .into_iter()
                .flatten()
                .filter_map(|id| indices.by_id.get(id))
                .map(|e| e.resource.clone())
                .collect(),
            None => indices
                .order
                .values()
                .filter_map(|id| indices.by_id.get(id))
                .map(|e| e.resource.clone())
                .collect(),
        }
    }

    fn notify(&self, action: RegistryAction, resource: SharedResource) {
        let watchers: Vec<Watcher> = self.watchers.read().iter().map(|(_, w)| w.clone()).collect();
        if watchers.is_empty() {
            return;
        }
        let event = RegistryEvent {
            action,
            resource,
            timestamp: Utc::now(),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    for watcher in watchers {
                        watcher(event.clone());
                    }
                });
            }
            Err(_) => {
                for watcher in watchers {
                    watcher(event.clone());
                }
            }
        }
    }
}
