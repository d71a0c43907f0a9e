//! Primitive actions: the leaf operations behavior steps dispatch to.
//!
//! The built-in table covers the device, filter, motor and session primitives the
//! shipped behaviors use. Steps naming an action that is not in the table are not
//! rejected: they run through a generic fallback that reports the action as
//! executed and marks the output with `"fallback": true`.

use crate::error::Result;
use crate::model::Params;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A single leaf operation. Implementations receive the call parameters merged
/// with everything earlier steps produced.
#[async_trait]
pub trait PrimitiveAction: Send + Sync {
    async fn run(&self, params: &Params) -> Result<Params>;
}

/// Adapts a plain function into a [`PrimitiveAction`].
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F> PrimitiveAction for FnAction<F>
where
    F: Fn(&Params) -> Result<Params> + Send + Sync,
{
    async fn run(&self, params: &Params) -> Result<Params> {
        (self.0)(params)
    }
}

/// Outcome of dispatching one action name.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Primitive(Params),
    Fallback(Params),
}

/// Name → action lookup shared by every executor.
#[derive(Clone, Default)]
pub struct ActionTable {
    actions: HashMap<String, Arc<dyn PrimitiveAction>>,
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.actions.keys().collect();
        names.sort();
        f.debug_struct("ActionTable").field("actions", &names).finish()
    }
}

impl ActionTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in primitive set.
    pub fn builtin() -> Self {
        let mut table = Self::empty();

        // Air purification
        table.register_fn("check_air_quality", |p| {
            Ok(stamped(json!({"current_quality": number(p, "air_quality")})))
        });
        table.register_fn("start_fan", |_| Ok(stamped(json!({"fan_started": true}))));
        table.register_fn("activate_filter", |_| {
            Ok(stamped(json!({"filter_activated": true})))
        });
        table.register_fn("monitor_progress", |_| Ok(stamped(json!({"progress": 0.8}))));

        // Filter status
        table.register_fn("read_filter_sensor", |p| {
            Ok(stamped(json!({"filter_id": string(p, "filter_id"), "sensor_value": 75.5})))
        });
        table.register_fn("calculate_usage", |_| Ok(stamped(json!({"usage_hours": 1200}))));
        table.register_fn("determine_status", |_| {
            Ok(stamped(json!({"status": "good", "remaining_life": 0.8})))
        });

        // Fan speed
        table.register_fn("validate_speed", |p| {
            let speed = string(p, "speed");
            let valid = matches!(speed.as_str(), "low" | "medium" | "high" | "auto");
            Ok(stamped(json!({"valid": valid})))
        });
        table.register_fn("set_motor_speed", |p| {
            Ok(stamped(json!({"motor_speed": string(p, "speed")})))
        });
        table.register_fn("confirm_speed", |_| Ok(stamped(json!({"confirmed": true}))));

        // Session and profile
        table.register_fn("validate_credentials", |_| Ok(stamped(json!({"valid": true}))));
        table.register_fn("check_permissions", |_| {
            Ok(stamped(json!({"permissions": ["read", "write"]})))
        });
        table.register_fn("generate_session", |_| {
            Ok(stamped(json!({"session_token": format!("token_{}", Utc::now().timestamp())})))
        });
        table.register_fn("load_user_profile", |p| {
            Ok(stamped(json!({
                "user_id": string(p, "user_id"),
                "profile": {"name": "user", "email": "user@example.com"},
            })))
        });
        table.register_fn("extract_preferences", |_| {
            Ok(stamped(json!({"preferences": {"language": "en-US", "theme": "light"}})))
        });
        table.register_fn("format_preferences", |_| Ok(stamped(json!({"formatted": true}))));
        table.register_fn("format_output", |_| Ok(stamped(json!({"formatted": true}))));

        table
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn PrimitiveAction>) {
        self.actions.insert(name.into(), action);
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Params) -> Result<Params> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnAction(f)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub async fn dispatch(&self, name: &str, params: &Params) -> Result<Dispatch> {
        match self.actions.get(name) {
            Some(action) => Ok(Dispatch::Primitive(action.run(params).await?)),
            None => Ok(Dispatch::Fallback(fallback(name))),
        }
    }
}

fn fallback(action: &str) -> Params {
    stamped(json!({"action": action, "executed": true, "fallback": true}))
}

fn stamped(value: Value) -> Params {
    let mut map = match value {
        Value::Object(map) => map,
        _ => Params::new(),
    };
    map.insert("timestamp".into(), json!(Utc::now().timestamp()));
    map
}

fn number(params: &Params, key: &str) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or_default()
}

fn string(params: &Params, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
