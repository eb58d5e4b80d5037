// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::flow::action::{ActionOutput, ActionResult, ActionRunner, ExecutionContext};
use crate::flow::condition::Condition;
use crate::flow::error::ActionError;
use crate::flow::graph::DEFAULT_PORT;

/// Entry node: forwards the event payload
#[derive(Debug, Default)]
pub struct StartAction;

#[async_trait]
impl ActionRunner for StartAction {
    async fn run(&self, payload: Value, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        log::debug!("Flow {} started for event {}", ctx.flow_id, ctx.event_id);
        Ok(ActionResult::new(DEFAULT_PORT, payload).into())
    }
}

/// Terminal node: emits nothing
#[derive(Debug, Default)]
pub struct EndAction;

#[async_trait]
impl ActionRunner for EndAction {
    async fn run(&self, _payload: Value, _ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        Ok(ActionOutput::None)
    }
}

#[derive(Debug, Deserialize)]
struct IfConfig {
    condition: String,
}

/// Routes the payload to the `true` or `false` port
#[derive(Debug, Default)]
pub struct IfAction {
    condition: Option<Condition>,
}

#[async_trait]
impl ActionRunner for IfAction {
    async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
        let config: IfConfig = serde_json::from_value(init)
            .map_err(|e| ActionError::config(format!("if: {}", e)))?;
        if config.condition.trim().is_empty() {
            return Err(ActionError::config("if: condition is empty"));
        }
        self.condition = Some(Condition::parse(&config.condition)?);
        Ok(())
    }

    async fn run(&self, payload: Value, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let condition = self
            .condition
            .as_ref()
            .ok_or_else(|| ActionError::config("if: not set up"))?;
        let port = if condition.evaluate(&ctx.accessor(&payload))? {
            "true"
        } else {
            "false"
        };
        Ok(ActionResult::new(port, payload).into())
    }
}
