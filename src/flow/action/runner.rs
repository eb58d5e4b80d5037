// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::context::ExecutionContext;
use crate::flow::error::ActionError;

/// One value emitted on a named output port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub port: String,
    /// `None` marks the port's edges as void for this round
    pub value: Option<Value>,
}

impl ActionResult {
    pub fn new(port: &str, value: Value) -> Self {
        Self {
            port: port.to_string(),
            value: Some(value),
        }
    }

    /// An explicit "nothing" on `port`
    pub fn void(port: &str) -> Self {
        Self {
            port: port.to_string(),
            value: None,
        }
    }
}

/// Everything an action may return from `run`
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// Nothing is emitted; outgoing edges stay dead
    None,
    One(ActionResult),
    Many(Vec<ActionResult>),
}

impl ActionOutput {
    pub fn into_results(self) -> Vec<ActionResult> {
        match self {
            ActionOutput::None => Vec::new(),
            ActionOutput::One(result) => vec![result],
            ActionOutput::Many(results) => results,
        }
    }
}

impl From<ActionResult> for ActionOutput {
    fn from(result: ActionResult) -> Self {
        ActionOutput::One(result)
    }
}

/// A unit of work wrapped by a flow node.
///
/// `run` takes `&self` because a node's tasks for one round run concurrently
/// on the same instance; runners keep per-call state in the context.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Configure the runner from the node's `init` document
    async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
        let _ = init;
        Ok(())
    }

    async fn run(&self, payload: Value, ctx: &ExecutionContext)
        -> Result<ActionOutput, ActionError>;

    /// Called after `run` fails
    async fn on_error(&self, error: &ActionError, ctx: &ExecutionContext) {
        let _ = (error, ctx);
    }

    /// Release resources held by the runner
    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_results() {
        assert!(ActionOutput::None.into_results().is_empty());
        assert_eq!(
            ActionOutput::from(ActionResult::new("payload", json!(1))).into_results(),
            vec![ActionResult::new("payload", json!(1))]
        );
        let many = ActionOutput::Many(vec![
            ActionResult::new("true", json!({})),
            ActionResult::void("false"),
        ]);
        assert_eq!(many.into_results().len(), 2);
    }

    #[test]
    fn test_void_result_has_no_value() {
        assert_eq!(ActionResult::void("payload").value, None);
    }
}
