//! # rosix demo
//!
//! Runs the air-purifier scenario end to end:
//! 1. Starts a [`Runtime`] with an `air_purifier` behavior and one purifier thing.
//! 2. Opens the purifier through the syscall layer and watches it.
//! 3. Invokes `purify_air`, reads features back and queries the actor's status.
//!
//! Set `ROSIX_CONFIG` to a configuration file and `RUST_LOG=info` (or `debug`) to
//! see the runtime at work.

use rosix::lifecycle::{setup_tracing, Runtime, RuntimeConfig};
use rosix::model::{Behavior, Function, ImplementationStep, ParamType, Parameter, Params, Thing};
use rosix::provider::InMemoryThingStore;
use rosix::syscall::{EventType, OpenMode};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Instrument};

fn air_purifier() -> Behavior {
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
                .output("progress", Parameter::new(ParamType::Number).required())
                .step(ImplementationStep::new(1, "check_air_quality").describe("Read the sensor"))
                .step(
                    ImplementationStep::new(2, "start_fan")
                        .when("current_quality > target_quality")
                        .describe("Spin up the fan"),
                )
                .step(
                    ImplementationStep::new(3, "activate_filter")
                        .when("fan_started == true")
                        .describe("Engage the HEPA filter"),
                )
                .step(ImplementationStep::new(4, "monitor_progress").describe("Track progress")),
        )
}

#[tokio::main]
async fn main() -> rosix::Result<()> {
    setup_tracing();

    let config_path = std::env::var_os("ROSIX_CONFIG").map(PathBuf::from);
    let config = RuntimeConfig::load(config_path.as_deref())?;

    let behaviors = Runtime::load_behaviors(&config)?;
    behaviors.put(air_purifier());
    let purifier = Thing::new("purifier-1", "Living room purifier", "machine")
        .with_attribute("model", "AP-100")
        .with_feature("power", "off")
        .with_behavior("air_purifier");
    let things = InMemoryThingStore::new([purifier]);

    let runtime = Runtime::start(config, Arc::new(behaviors), Arc::new(things)).await?;
    let system = runtime.system.clone();

    let ctx = system.create_context("demo", "session-1", Params::new());
    let rd = system.open(
        "/things/machine/purifier-1",
        OpenMode::READ | OpenMode::WRITE | OpenMode::INVOKE | OpenMode::WATCH,
        &ctx,
    )?;
    system.watch(rd, &[EventType::BehaviorInvoked, EventType::FeatureUpdate], |event| {
        info!(event = ?event.event_type, resource = %event.resource_id, "Event");
    })?;

    system.write(rd, "power", json!("on")).await?;

    let mut params = Params::new();
    params.insert("air_quality".into(), json!(150.0));
    params.insert("target_quality".into(), json!(50.0));

    let span = tracing::info_span!("purify_air");
    let outcome = async {
        info!("Invoking purify_air through the syscall layer");
        system.invoke(rd, "purify_air", params).await
    }
    .instrument(span)
    .await;

    match outcome {
        Ok(result) => info!(result = %json!(result), "purify_air completed"),
        Err(e) => error!(error = %e, "purify_air failed"),
    }

    info!(model = %system.read(rd, "model")?, power = %system.read(rd, "power")?, "Purifier");
    let status = runtime.manager.actor_status("air_purifier").await?;
    info!(
        state = %status.state,
        last_active = %status.last_active,
        processed = status.processed,
        "Actor status"
    );

    system.close(rd)?;
    system.destroy_context(&ctx);
    runtime.shutdown().await?;

    info!("Demo completed successfully");
    Ok(())
}
