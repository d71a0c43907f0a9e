//! Thing records: the twins behind device/object/person resources.

use super::Params;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A thing shared between its store, its resource adapter and the syscall layer.
///
/// Adapters hold this reference rather than a copy, so a write through one
/// descriptor is visible to every later read.
pub type SharedThing = Arc<RwLock<Thing>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: String,
    pub name: String,
    /// Free-form kind such as `"machine"`, `"person"` or `"object"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Params,
    #[serde(default)]
    pub features: Params,
    /// Ids of the behaviors bound to this thing.
    #[serde(default, alias = "behaviorIds")]
    pub behavior_ids: Vec<String>,
    #[serde(default)]
    pub metadata: Params,
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Thing {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            description: String::new(),
            attributes: Params::new(),
            features: Params::new(),
            behavior_ids: Vec::new(),
            metadata: Params::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }

    pub fn with_behavior(mut self, behavior_id: impl Into<String>) -> Self {
        self.behavior_ids.push(behavior_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets a feature and bumps `updated_at`.
    pub fn set_feature(&mut self, key: impl Into<String>, value: Value) {
        self.features.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn into_shared(self) -> SharedThing {
        Arc::new(RwLock::new(self))
    }
}
