//! # Function Executor
//!
//! Interprets one behavior's functions. A call goes through three phases:
//!
//! 1. **Input validation**: required parameters present, declared types match,
//!    numeric range, enum membership, string length. Absent optional inputs with a
//!    declared default are filled in. A failure here has no side effects.
//! 2. **Step interpretation**: steps run in ascending `step` order. A step whose
//!    guard condition is false is skipped. Otherwise its action is dispatched to the
//!    [`ActionTable`] and the output is merged into the running result (later keys
//!    overwrite earlier ones).
//! 3. **Output validation**: every required output must be present.
//!
//! Effects of steps that already ran are not undone when a later step or the
//! output check fails.

use super::actor::FunctionTable;
use super::condition;
use super::primitives::{ActionTable, Dispatch};
use crate::error::{Result, RosixError};
use crate::model::{Behavior, Function, Parameter, ParamType, Params};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a single step was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Dispatched,
    Fallback,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: u32,
    pub action: String,
    pub status: StepStatus,
}

/// The output of a call plus what each step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub output: Params,
    pub steps: Vec<StepReport>,
}

impl Execution {
    /// True if no step ran through the generic fallback.
    pub fn fully_dispatched(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Fallback)
    }
}

/// Schema summary of one function, for introspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub description: String,
    pub input_params: BTreeMap<String, Parameter>,
    pub output_params: BTreeMap<String, Parameter>,
    pub steps: usize,
}

#[derive(Debug, Clone)]
pub struct FunctionExecutor {
    behavior: Arc<Behavior>,
    actions: Arc<ActionTable>,
}

impl FunctionExecutor {
    pub fn new(behavior: Arc<Behavior>, actions: Arc<ActionTable>) -> Self {
        Self { behavior, actions }
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.behavior.functions.contains_key(name)
    }

    pub fn function_names(&self) -> Vec<String> {
        self.behavior.function_names()
    }

    pub fn function_info(&self, name: &str) -> Result<FunctionInfo> {
        let function = self.function(name)?;
        Ok(FunctionInfo {
            name: function.name.clone(),
            description: function.description.clone(),
            input_params: function.input_params.clone(),
            output_params: function.output_params.clone(),
            steps: function.implementation.steps.len(),
        })
    }

    pub async fn execute(&self, name: &str, params: &Params) -> Result<Params> {
        Ok(self.execute_traced(name, params).await?.output)
    }

    pub async fn execute_traced(&self, name: &str, params: &Params) -> Result<Execution> {
        let function = self.function(name)?;
        let params = validate_inputs(function, params)?;

        let mut steps: Vec<_> = function.implementation.steps.iter().collect();
        steps.sort_by_key(|s| s.step);

        let mut output = Params::new();
        let mut reports = Vec::with_capacity(steps.len());
        for step in steps {
            let guard = step.condition.as_deref().unwrap_or("");
            let run = condition::evaluate(guard, &params, &output).map_err(|e| {
                RosixError::Execution(format!(
                    "{name}: step {} has invalid condition '{guard}': {e}",
                    step.step
                ))
            })?;
            if !run {
                debug!(function = name, step = step.step, action = %step.action, "Step skipped");
                reports.push(report(step.step, &step.action, StepStatus::Skipped));
                continue;
            }

            // Actions see the call parameters overlaid with earlier step output.
            let mut scope = params.clone();
            scope.extend(output.clone());

            let dispatched = self.actions.dispatch(&step.action, &scope).await.map_err(|e| {
                RosixError::Execution(format!(
                    "{name}: step {} ({}) failed: {e}",
                    step.step, step.action
                ))
            })?;
            let (step_output, status) = match dispatched {
                Dispatch::Primitive(out) => (out, StepStatus::Dispatched),
                Dispatch::Fallback(out) => {
                    warn!(
                        function = name,
                        action = %step.action,
                        "No primitive for action, using fallback"
                    );
                    (out, StepStatus::Fallback)
                }
            };
            output.extend(step_output);
            reports.push(report(step.step, &step.action, status));
        }

        validate_outputs(function, &output)?;
        Ok(Execution {
            output,
            steps: reports,
        })
    }

    fn function(&self, name: &str) -> Result<&Function> {
        self.behavior.functions.get(name).ok_or_else(|| {
            RosixError::NotFound(format!("function {name} in behavior {}", self.behavior.id))
        })
    }
}

#[async_trait]
impl FunctionTable for FunctionExecutor {
    fn functions(&self) -> Vec<String> {
        self.function_names()
    }

    async fn call(&mut self, function: &str, params: &Params) -> Result<Params> {
        self.execute(function, params).await
    }
}

fn report(step: u32, action: &str, status: StepStatus) -> StepReport {
    StepReport {
        step,
        action: action.to_string(),
        status,
    }
}

/// Checks `params` against the input schema and returns them with defaults applied.
pub fn validate_inputs(function: &Function, params: &Params) -> Result<Params> {
    let mut validated = params.clone();
    for (name, schema) in &function.input_params {
        match params.get(name) {
            Some(value) => check_value(&function.name, name, schema, value)?,
            None if schema.required => {
                return Err(RosixError::Validation(format!(
                    "{}: required parameter '{name}' is missing",
                    function.name
                )));
            }
            None => {
                if let Some(default) = &schema.default {
                    validated.insert(name.clone(), default.clone());
                }
            }
        }
    }
    Ok(validated)
}

fn validate_outputs(function: &Function, output: &Params) -> Result<()> {
    for (name, schema) in &function.output_params {
        if schema.required && !output.contains_key(name) {
            return Err(RosixError::Validation(format!(
                "{}: required output '{name}' was not produced",
                function.name
            )));
        }
    }
    Ok(())
}

fn check_value(function: &str, name: &str, schema: &Parameter, value: &Value) -> Result<()> {
    let invalid = |reason: String| {
        Err(RosixError::Validation(format!(
            "{function}: parameter '{name}' {reason}"
        )))
    };

    if !schema.param_type.matches(value) {
        return invalid(format!("must be of type {}", schema.param_type.name()));
    }

    if schema.param_type == ParamType::Number {
        if let Some(n) = value.as_f64() {
            if let Some(min) = schema.min.filter(|min| n < *min) {
                return invalid(format!("must be >= {min}, got {n}"));
            }
            if let Some(max) = schema.max.filter(|max| n > *max) {
                return invalid(format!("must be <= {max}, got {n}"));
            }
        }
    }

    if let (Some(limit), Some(s)) = (schema.max_length, value.as_str()) {
        if s.chars().count() > limit {
            return invalid(format!("exceeds max length {limit}"));
        }
    }

    if let Some(allowed) = &schema.allowed {
        if !allowed.iter().any(|candidate| same_value(candidate, value)) {
            return invalid(format!("must be one of {}", Value::Array(allowed.clone())));
        }
    }

    Ok(())
}

/// Equality that treats `1` and `1.0` as the same number.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
