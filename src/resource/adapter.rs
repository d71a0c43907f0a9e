//! Resource adapters.
//!
//! An adapter holds a reference to its domain object and projects it on demand,
//! so two reads through the same adapter can observe different features if the
//! object changed in between.

use super::{Resource, ResourceMetadata, ResourcePath, ResourceType};
use crate::actor::{ActorState, BehaviorCatalog, ManagedActor};
use crate::model::{Params, SharedThing};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

/// Projects a [`Thing`](crate::model::Thing) as a resource at `/things/{kind}/{id}`.
pub struct ThingAdapter {
    id: String,
    path: ResourcePath,
    thing: SharedThing,
    catalog: Option<Arc<BehaviorCatalog>>,
}

impl ThingAdapter {
    pub fn new(thing: SharedThing) -> Self {
        let (id, path) = {
            let t = thing.read();
            (t.id.clone(), ResourcePath::thing(&t.kind, &t.id))
        };
        Self {
            id,
            path,
            thing,
            catalog: None,
        }
    }

    /// Resolves bound behavior ids to function names through `catalog`.
    pub fn with_catalog(mut self, catalog: Arc<BehaviorCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }
}

/// Maps a free-form thing kind onto a resource type. Anything unrecognized is a device.
pub fn thing_resource_type(kind: &str) -> ResourceType {
    match kind.to_ascii_lowercase().as_str() {
        "person" | "user" => ResourceType::Person,
        "object" => ResourceType::Object,
        "service" => ResourceType::Service,
        _ => ResourceType::Device,
    }
}

impl Resource for ThingAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn resource_type(&self) -> ResourceType {
        thing_resource_type(&self.thing.read().kind)
    }

    fn attributes(&self) -> Params {
        let thing = self.thing.read();
        let mut attributes = thing.attributes.clone();
        attributes.insert("id".into(), json!(thing.id));
        attributes.insert("name".into(), json!(thing.name));
        attributes.insert("type".into(), json!(thing.kind));
        attributes.insert("description".into(), json!(thing.description));
        attributes
    }

    fn features(&self) -> Params {
        self.thing.read().features.clone()
    }

    fn behaviors(&self) -> Vec<String> {
        match &self.catalog {
            Some(catalog) => catalog.functions_of(&self.thing.read().behavior_ids),
            None => Vec::new(),
        }
    }

    fn metadata(&self) -> ResourceMetadata {
        let thing = self.thing.read();
        ResourceMetadata {
            name: thing.name.clone(),
            description: thing.description.clone(),
            category: thing.kind.clone(),
            tags: vec![thing.kind.clone()],
            owner: thing
                .metadata
                .get("owner")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: thing.created_at,
            updated_at: thing.updated_at,
            extra: thing.metadata.clone(),
        }
    }

    fn thing(&self) -> Option<SharedThing> {
        Some(self.thing.clone())
    }

    fn behavior_ids(&self) -> Vec<String> {
        self.thing.read().behavior_ids.clone()
    }
}

/// Projects a live actor as a resource at `/actors/{id}`.
pub struct ActorAdapter {
    path: ResourcePath,
    managed: ManagedActor,
}

impl ActorAdapter {
    pub fn new(managed: ManagedActor) -> Self {
        Self {
            path: ResourcePath::actor(managed.id()),
            managed,
        }
    }
}

impl Resource for ActorAdapter {
    fn id(&self) -> &str {
        self.managed.id()
    }

    fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Actor
    }

    fn attributes(&self) -> Params {
        let behavior = &self.managed.behavior;
        let mut attributes = Params::new();
        attributes.insert("id".into(), json!(behavior.id));
        attributes.insert("name".into(), json!(behavior.name));
        attributes.insert("category".into(), json!(behavior.category));
        attributes.insert("type".into(), json!(behavior.behavior_type));
        attributes
    }

    fn features(&self) -> Params {
        let status = self.managed.actor.status();
        let mut features = Params::new();
        features.insert("status".into(), json!(status.state.to_string()));
        features.insert("last_active".into(), json!(status.last_active.to_rfc3339()));
        features.insert("processed".into(), json!(status.processed));
        features.insert("queued".into(), json!(status.queued));
        features
    }

    fn behaviors(&self) -> Vec<String> {
        self.managed.behavior.function_names()
    }

    fn metadata(&self) -> ResourceMetadata {
        let behavior = &self.managed.behavior;
        let description = if behavior.description.is_empty() {
            "Actor resource".to_string()
        } else {
            behavior.description.clone()
        };
        ResourceMetadata {
            name: behavior.name.clone(),
            description,
            category: "actor".into(),
            tags: vec!["actor".into(), "behavior".into()],
            owner: String::new(),
            created_at: behavior.created_at,
            updated_at: behavior.updated_at,
            extra: Params::new(),
        }
    }

    fn behavior_ids(&self) -> Vec<String> {
        vec![self.managed.id().to_string()]
    }

    fn state_changes(&self) -> Option<watch::Receiver<ActorState>> {
        Some(self.managed.actor.watch_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorManager, ActorOptions};
    use crate::model::{Behavior, Function, Thing};

    #[test]
    fn test_thing_adapter_reflects_live_state() {
        let thing = Thing::new("p1", "Purifier", "machine")
            .with_feature("power", "off")
            .with_attribute("model", "AP-100")
            .into_shared();
        let adapter = ThingAdapter::new(thing.clone());

        assert_eq!(adapter.path().as_str(), "/things/machine/p1");
        assert_eq!(adapter.resource_type(), ResourceType::Device);
        assert_eq!(adapter.attributes()["model"], "AP-100");
        assert_eq!(adapter.attributes()["name"], "Purifier");
        assert_eq!(adapter.features()["power"], "off");

        thing.write().set_feature("power", json!("on"));
        assert_eq!(adapter.features()["power"], "on");
    }

    #[test]
    fn test_thing_kinds_map_to_types() {
        assert_eq!(thing_resource_type("person"), ResourceType::Person);
        assert_eq!(thing_resource_type("Object"), ResourceType::Object);
        assert_eq!(thing_resource_type("service"), ResourceType::Service);
        assert_eq!(thing_resource_type("sensor"), ResourceType::Device);
    }

    #[test]
    fn test_thing_behaviors_come_from_catalog() {
        let catalog = Arc::new(BehaviorCatalog::new());
        catalog.insert(Arc::new(
            Behavior::new("purifier", "Purifier").with_function(Function::new("purify_air")),
        ));
        let thing = Thing::new("p1", "Purifier", "machine")
            .with_behavior("purifier")
            .into_shared();

        let bare = ThingAdapter::new(thing.clone());
        assert!(bare.behaviors().is_empty());
        let bound = ThingAdapter::new(thing).with_catalog(catalog);
        assert_eq!(bound.behaviors(), ["purify_air"]);
        assert_eq!(bound.behavior_ids(), ["purifier"]);
    }

    #[tokio::test]
    async fn test_actor_adapter_tracks_state() {
        let manager = ActorManager::new(ActorOptions::default());
        let managed = manager
            .create_actor_from_behavior(
                Behavior::new("fan", "Fan").with_function(Function::new("spin")),
            )
            .unwrap();
        let adapter = ActorAdapter::new(managed);

        assert_eq!(adapter.path().as_str(), "/actors/fan");
        assert_eq!(adapter.features()["status"], "running");
        assert_eq!(adapter.behaviors(), ["spin"]);

        manager.stop_actor("fan").await.unwrap();
        assert_eq!(adapter.features()["status"], "stopped");
    }
}
