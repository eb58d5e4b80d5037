// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::flow::action::{ActionOutput, ActionResult, ActionRunner, ExecutionContext};
use crate::flow::dot::{entity::read, DotPath, Namespace, ReshapeOptions};
use crate::flow::error::{AccessorError, ActionError};
use crate::flow::graph::DEFAULT_PORT;

fn default_step() -> Value {
    Value::from(1)
}

#[derive(Debug, Deserialize)]
struct IncrementConfig {
    field: String,
    #[serde(default = "default_step")]
    increment: Value,
}

/// Adds a number to a profile field, creating it at zero
#[derive(Debug, Default)]
pub struct IncrementAction {
    field: Option<DotPath>,
    step: Option<Number>,
}

#[async_trait]
impl ActionRunner for IncrementAction {
    async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
        let config: IncrementConfig = serde_json::from_value(init)
            .map_err(|e| ActionError::config(format!("increment: {}", e)))?;

        let field = DotPath::parse(&config.field).ok_or_else(|| {
            ActionError::config(format!("increment: '{}' is not a dot path", config.field))
        })?;
        if field.namespace != Namespace::Profile || field.is_whole_namespace() {
            return Err(ActionError::config(
                "increment: field must point inside the profile",
            ));
        }
        let Value::Number(step) = config.increment else {
            return Err(ActionError::config("increment: increment must be a number"));
        };

        self.field = Some(field);
        self.step = Some(step);
        Ok(())
    }

    async fn run(&self, payload: Value, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let (Some(field), Some(step)) = (&self.field, &self.step) else {
            return Err(ActionError::config("increment: not set up"));
        };
        let dot = ctx.accessor(&payload);

        let current = match dot.get_path(field) {
            Ok(Value::Null) | Err(AccessorError::MissingField(_)) => Value::from(0),
            Ok(Value::Number(n)) => Value::Number(n),
            Ok(other) => {
                return Err(ActionError::runtime(format!(
                    "increment: {} holds a non-numeric value {}",
                    field, other
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let next = add(&current, step)
            .ok_or_else(|| ActionError::runtime(format!("increment: {} overflowed", field)))?;
        dot.set_path(field, next)?;
        Ok(ActionResult::new(DEFAULT_PORT, payload).into())
    }
}

fn add(current: &Value, step: &Number) -> Option<Value> {
    match (current.as_i64(), step.as_i64()) {
        (Some(a), Some(b)) => a.checked_add(b).map(Value::from),
        _ => {
            let sum = current.as_f64()? + step.as_f64()?;
            Number::from_f64(sum).map(Value::Number)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SetValueConfig {
    path: String,
    value: Value,
}

/// Writes a value (or the value behind a dot path) to a dot path.
/// Writes to `payload` change the emitted payload.
#[derive(Debug, Default)]
pub struct SetValueAction {
    path: String,
    value: Value,
}

#[async_trait]
impl ActionRunner for SetValueAction {
    async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
        let config: SetValueConfig = serde_json::from_value(init)
            .map_err(|e| ActionError::config(format!("set_value: {}", e)))?;
        let path = DotPath::parse(&config.path).ok_or_else(|| {
            ActionError::config(format!("set_value: '{}' is not a dot path", config.path))
        })?;
        if path.namespace.is_read_only() {
            return Err(ActionError::config(format!(
                "set_value: namespace '{}' is read-only",
                path.namespace
            )));
        }
        self.path = config.path;
        self.value = config.value;
        Ok(())
    }

    async fn run(&self, payload: Value, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let dot = ctx.accessor(&payload);
        dot.set(&self.path, self.value.clone())?;

        let payload = match dot.entity(Namespace::Payload) {
            Some(entity) => read(entity).clone(),
            None => payload,
        };
        Ok(ActionResult::new(DEFAULT_PORT, payload).into())
    }
}

#[derive(Debug, Deserialize)]
struct ReshapeConfig {
    template: Value,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    default: Value,
}

/// Emits `template` with every dot-path leaf resolved
#[derive(Debug, Default)]
pub struct ReshapeAction {
    template: Value,
    options: ReshapeOptions,
}

#[async_trait]
impl ActionRunner for ReshapeAction {
    async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
        let config: ReshapeConfig = serde_json::from_value(init)
            .map_err(|e| ActionError::config(format!("reshape: {}", e)))?;
        self.template = config.template;
        self.options = ReshapeOptions {
            strict: config.strict,
            default: config.default,
        };
        Ok(())
    }

    async fn run(&self, payload: Value, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let reshaped = ctx.accessor(&payload).reshape(&self.template, &self.options)?;
        Ok(ActionResult::new(DEFAULT_PORT, reshaped).into())
    }
}
