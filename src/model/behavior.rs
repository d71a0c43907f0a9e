//! Behavior definitions.
//!
//! A [`Behavior`] is a declarative bundle of named functions. Each [`Function`] carries
//! an input schema, an output schema and an ordered list of guarded
//! [`ImplementationStep`]s. The runtime never owns these records: they come from a
//! [`BehaviorStore`](crate::provider::BehaviorStore) and are interpreted by the
//! [`FunctionExecutor`](crate::actor::FunctionExecutor).
//!
//! The serde layout matches the behavior JSON files on disk:
//!
//! ```json
//! {
//!   "id": "purifier",
//!   "name": "Air Purifier",
//!   "type": "device_control",
//!   "category": "device",
//!   "functions": {
//!     "purify_air": {
//!       "name": "purify_air",
//!       "input_params": {
//!         "air_quality": { "type": "number", "required": true, "min": 0, "max": 500 }
//!       },
//!       "output_params": {},
//!       "implementation": { "steps": [ { "step": 1, "action": "check_air_quality" } ] }
//!     }
//!   }
//! }
//! ```

use super::Params;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub behavior_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub functions: BTreeMap<String, Function>,
    #[serde(default)]
    pub parameters: Params,
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Behavior {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            behavior_type: String::new(),
            description: String::new(),
            category: String::new(),
            functions: BTreeMap::new(),
            parameters: Params::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_type(mut self, behavior_type: impl Into<String>) -> Self {
        self.behavior_type = behavior_type.into();
        self
    }

    /// Adds a function keyed by its own name.
    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.insert(function.name.clone(), function);
        self
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_params: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub output_params: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub implementation: Implementation,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_params: BTreeMap::new(),
            output_params: BTreeMap::new(),
            implementation: Implementation::default(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, param: Parameter) -> Self {
        self.input_params.insert(name.into(), param);
        self
    }

    pub fn output(mut self, name: impl Into<String>, param: Parameter) -> Self {
        self.output_params.insert(name.into(), param);
        self
    }

    pub fn step(mut self, step: ImplementationStep) -> Self {
        self.implementation.steps.push(step);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    #[serde(default)]
    pub steps: Vec<ImplementationStep>,
}

/// Declared runtime type of a parameter.
///
/// Unknown type names deserialize to [`ParamType::Any`] and are not type-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    #[serde(other)]
    Any,
}

impl ParamType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        }
    }
}

/// One entry of a function's input or output schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl Parameter {
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            description: String::new(),
            required: false,
            default: None,
            min: None,
            max: None,
            allowed: None,
            max_length: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationStep {
    pub step: u32,
    pub action: String,
    #[serde(default)]
    pub description: String,
    /// Guard expression; see [`crate::actor::condition`]. Empty means "always".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl ImplementationStep {
    pub fn new(step: u32, action: impl Into<String>) -> Self {
        Self {
            step,
            action: action.into(),
            description: String::new(),
            condition: None,
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
