// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::flow::action::{ActionOutput, ActionResult, ActionRunner, ConsoleLevel, ExecutionContext};
use crate::flow::dot::Resolved;
use crate::flow::error::ActionError;
use crate::flow::graph::DEFAULT_PORT;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Deserialize)]
struct LogConfig {
    message: String,
    #[serde(default = "LogConfig::default_level")]
    level: LogLevel,
}

impl LogConfig {
    fn default_level() -> LogLevel {
        LogLevel::Info
    }
}

/// Writes a message to the walk console and forwards the payload
#[derive(Debug)]
pub struct LogAction {
    message: String,
    level: ConsoleLevel,
}

impl Default for LogAction {
    fn default() -> Self {
        Self {
            message: String::new(),
            level: ConsoleLevel::Info,
        }
    }
}

#[async_trait]
impl ActionRunner for LogAction {
    async fn set_up(&mut self, init: Value) -> Result<(), ActionError> {
        let config: LogConfig = serde_json::from_value(init)
            .map_err(|e| ActionError::config(format!("log: {}", e)))?;
        self.message = config.message;
        self.level = match config.level {
            LogLevel::Info => ConsoleLevel::Info,
            LogLevel::Warning => ConsoleLevel::Warning,
            LogLevel::Error => ConsoleLevel::Error,
        };
        Ok(())
    }

    async fn run(&self, payload: Value, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        ctx.log(self.level, resolve_message(&self.message, ctx, &payload));
        Ok(ActionResult::new(DEFAULT_PORT, payload).into())
    }
}

/// The message itself, or what it resolves to when it is a dot path
fn resolve_message(message: &str, ctx: &ExecutionContext, payload: &Value) -> String {
    match ctx.accessor(payload).get(message) {
        Ok(Resolved::Value(Value::String(s))) => s,
        Ok(Resolved::Value(other)) => other.to_string(),
        Ok(Resolved::NotAPath(s)) => s,
        Err(_) => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::dot::{entity, EntityCell};
    use serde_json::json;

    #[tokio::test]
    async fn test_log_resolves_message() {
        let ctx = ExecutionContext::new(
            "flow",
            "event",
            EntityCell::new(json!({"id": "p1"})),
            EntityCell::new(json!({})),
            entity(json!({})),
        )
        .for_node("logger", None);

        let mut action = LogAction::default();
        action
            .set_up(json!({"message": "profile@id", "level": "warning"}))
            .await
            .unwrap();
        action.run(json!({}), &ctx).await.unwrap();

        let mut plain = LogAction::default();
        plain.set_up(json!({"message": "hello"})).await.unwrap();
        plain.run(json!({}), &ctx).await.unwrap();

        let entries = ctx.console().entries();
        assert_eq!(entries[0].message, "p1");
        assert_eq!(entries[0].level, ConsoleLevel::Warning);
        assert_eq!(entries[1].message, "hello");
        assert_eq!(entries[1].node_id, "logger");
    }
}
