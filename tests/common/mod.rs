#![allow(dead_code)]

use rosix::actor::{ActorManager, ActorOptions};
use rosix::model::{Behavior, Function, ImplementationStep, ParamType, Parameter, Params, Thing};
use rosix::provider::InMemoryThingStore;
use rosix::resource::Registry;
use rosix::syscall::System;
use serde_json::Value;
use std::sync::Arc;

/// The air purifier behavior: check quality, start fan, activate filter, monitor.
pub fn purifier_behavior() -> Behavior {
    Behavior::new("air_purifier", "Air Purifier")
        .with_category("machine")
        .with_type("device_control")
        .with_function(
            Function::new("purify_air")
                .input(
                    "air_quality",
                    Parameter::new(ParamType::Number).required().range(0.0, 500.0),
                )
                .input(
                    "target_quality",
                    Parameter::new(ParamType::Number).range(0.0, 500.0).default_value(50.0),
                )
                .output("current_quality", Parameter::new(ParamType::Number).required())
                .output("progress", Parameter::new(ParamType::Number).required())
                .step(ImplementationStep::new(1, "check_air_quality"))
                .step(
                    ImplementationStep::new(2, "start_fan")
                        .when("current_quality > target_quality"),
                )
                .step(
                    ImplementationStep::new(3, "activate_filter").when("fan_started == true"),
                )
                .step(ImplementationStep::new(4, "monitor_progress")),
        )
}

pub fn purifier_thing() -> Thing {
    Thing::new("purifier-1", "Living room purifier", "machine")
        .with_attribute("model", "AP-100")
        .with_feature("power", "off")
        .with_behavior("air_purifier")
}

/// A system with the purifier actor and thing, already synced into the registry.
pub async fn purifier_system() -> (System, Arc<InMemoryThingStore>) {
    let manager = Arc::new(ActorManager::new(ActorOptions::default()));
    manager
        .create_actor_from_behavior(purifier_behavior())
        .expect("purifier actor");
    let things = Arc::new(InMemoryThingStore::new([purifier_thing()]));
    let system = System::new(Arc::new(Registry::new()), manager).with_things(things.clone());
    system.sync_resources().await.expect("sync");
    (system, things)
}

pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}
