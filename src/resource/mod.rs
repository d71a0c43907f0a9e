//! # Resources
//!
//! The uniform view every managed entity presents to the syscall layer: identity,
//! a hierarchical path, a type, static attributes, dynamic features, the names of
//! the behaviors it can run, and descriptive metadata.
//!
//! [`Resource`] is implemented by adapters ([`adapter`]) that project a domain
//! object on every call rather than caching a snapshot. The [`registry`] indexes
//! resources by id, path and type.
//!
//! Paths follow two shapes:
//!
//! ```text
//! /things/{kind}/{id}
//! /actors/{id}
//! ```

pub mod adapter;
pub mod registry;

pub use adapter::{ActorAdapter, ThingAdapter};
pub use registry::{Registry, RegistryAction, RegistryEvent, WatchId};

use crate::actor::ActorState;
use crate::model::{Params, SharedThing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Device,
    Object,
    Person,
    Service,
    Actor,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::Device => "device",
            ResourceType::Object => "object",
            ResourceType::Person => "person",
            ResourceType::Service => "service",
            ResourceType::Actor => "actor",
        };
        f.write_str(s)
    }
}

/// Hierarchical resource path such as `/things/machine/purifier-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn thing(kind: &str, id: &str) -> Self {
        Self(format!("/things/{kind}/{id}"))
    }

    pub fn actor(id: &str) -> Self {
        Self(format!("/actors/{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` equals `prefix` or lies below it. `"/"` contains everything.
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match self.0.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourcePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ResourcePath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: Params,
}

/// Read-only view of a managed entity.
///
/// `id` and `path` must not change for the lifetime of the resource. Everything
/// else is read from the backing entity on each call.
pub trait Resource: Send + Sync {
    fn id(&self) -> &str;
    fn path(&self) -> &ResourcePath;
    fn resource_type(&self) -> ResourceType;
    fn attributes(&self) -> Params;
    fn features(&self) -> Params;
    /// Names of the functions this resource can invoke.
    fn behaviors(&self) -> Vec<String>;
    fn metadata(&self) -> ResourceMetadata;

    /// The backing thing, for resources that accept writes.
    fn thing(&self) -> Option<SharedThing> {
        None
    }

    /// Ids of the behaviors bound to this resource, used to route invokes.
    fn behavior_ids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Live state transitions, for resources backed by an actor.
    fn state_changes(&self) -> Option<watch::Receiver<ActorState>> {
        None
    }
}

pub type SharedResource = Arc<dyn Resource>;

/// Serializable snapshot of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView {
    pub id: String,
    pub path: ResourcePath,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub attributes: Params,
    pub features: Params,
    pub behaviors: Vec<String>,
    pub metadata: ResourceMetadata,
}

impl ResourceView {
    pub fn of(resource: &dyn Resource) -> Self {
        Self {
            id: resource.id().to_string(),
            path: resource.path().clone(),
            resource_type: resource.resource_type(),
            attributes: resource.attributes(),
            features: resource.features(),
            behaviors: resource.behaviors(),
            metadata: resource.metadata(),
        }
    }
}

/// Resource predicate used by [`Registry::query`].
///
/// All set fields must match. Tags match if the resource carries any of them;
/// attributes and features match by key/value equality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub attributes: Params,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub features: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn feature(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn matches(&self, resource: &dyn Resource) -> bool {
        if self
            .resource_type
            .is_some_and(|t| t != resource.resource_type())
        {
            return false;
        }

        if self.category.is_some() || !self.tags.is_empty() {
            let metadata = resource.metadata();
            if self
                .category
                .as_ref()
                .is_some_and(|c| *c != metadata.category)
            {
                return false;
            }
            if !self.tags.is_empty() && !self.tags.iter().any(|t| metadata.tags.contains(t)) {
                return false;
            }
        }

        if !self.attributes.is_empty() && !contains_all(&resource.attributes(), &self.attributes) {
            return false;
        }
        if !self.features.is_empty() && !contains_all(&resource.features(), &self.features) {
            return false;
        }
        true
    }
}

fn contains_all(have: &Params, want: &Params) -> bool {
    want.iter().all(|(k, v)| have.get(k) == Some(v))
}
