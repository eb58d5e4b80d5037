// SPDX-License-Identifier: MIT

//! Per-node execution context
//!
//! Carries shared handles to the walk's entities. Profile and session are
//! held in [`EntityCell`]s so that an action can swap the whole document
//! through `replace_profile` / `replace_session`; the invoker notices the
//! swap by pointer identity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::flow::dot::{entity, DotAccessor, Entity, EntityCell, Namespace};
use crate::flow::dot::entity::write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Info,
    Warning,
    Error,
}

/// One line written to the console sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleEntry {
    pub flow_id: String,
    pub node_id: String,
    pub event_id: String,
    pub level: ConsoleLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Structured log sink shared by a walk, mirrored to the `log` facade
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    entries: Arc<Mutex<Vec<ConsoleEntry>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: ConsoleEntry) {
        match entry.level {
            ConsoleLevel::Info => log::info!("[{}/{}] {}", entry.flow_id, entry.node_id, entry.message),
            ConsoleLevel::Warning => {
                log::warn!("[{}/{}] {}", entry.flow_id, entry.node_id, entry.message)
            }
            ConsoleLevel::Error => {
                log::error!("[{}/{}] {}", entry.flow_id, entry.node_id, entry.message)
            }
        }
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Context handed to every `run` call
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub flow_id: String,
    pub node_id: String,
    pub event_id: String,
    /// Edge the current payload arrived on; `None` for start nodes
    pub in_edge: Option<String>,
    pub debug: bool,
    profile: EntityCell,
    session: EntityCell,
    event: Entity,
    flow: Entity,
    memory: Entity,
    metrics: Entity,
    console: ConsoleLog,
}

impl ExecutionContext {
    /// Context for a walk, not yet bound to a node
    pub fn new(
        flow_id: &str,
        event_id: &str,
        profile: EntityCell,
        session: EntityCell,
        event: Entity,
    ) -> Self {
        let flow = entity(serde_json::json!({ "id": flow_id }));
        Self {
            flow_id: flow_id.to_string(),
            node_id: String::new(),
            event_id: event_id.to_string(),
            in_edge: None,
            debug: false,
            profile,
            session,
            event,
            flow,
            memory: entity(Value::Object(Default::default())),
            metrics: entity(Value::Object(Default::default())),
            console: ConsoleLog::new(),
        }
    }

    pub fn with_flow_document(mut self, flow: Value) -> Self {
        self.flow = entity(flow);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Copy of this context bound to one node and input edge
    pub fn for_node(&self, node_id: &str, in_edge: Option<&str>) -> Self {
        let mut ctx = self.clone();
        ctx.node_id = node_id.to_string();
        ctx.in_edge = in_edge.map(str::to_string);
        ctx
    }

    /// Current profile
    pub fn profile(&self) -> Entity {
        self.profile.current()
    }

    /// Current session
    pub fn session(&self) -> Entity {
        self.session.current()
    }

    pub fn event(&self) -> &Entity {
        &self.event
    }

    pub fn memory(&self) -> &Entity {
        &self.memory
    }

    /// Walk-wide metrics written by actions, returned in the outcome
    pub fn metrics(&self) -> &Entity {
        &self.metrics
    }

    pub fn set_metric(&self, name: &str, value: Value) {
        if let Value::Object(map) = &mut *write(&self.metrics) {
            map.insert(name.to_string(), value);
        }
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    /// Swap the walk's profile for a new document
    pub fn replace_profile(&self, value: Value) -> Entity {
        log::debug!("Node {} replaced the profile", self.node_id);
        self.profile.replace(value)
    }

    /// Swap the walk's session for a new document
    pub fn replace_session(&self, value: Value) -> Entity {
        log::debug!("Node {} replaced the session", self.node_id);
        self.session.replace(value)
    }

    /// Accessor over the walk entities with `payload` bound to a private copy
    pub fn accessor(&self, payload: &Value) -> DotAccessor {
        DotAccessor::new()
            .bind(Namespace::Profile, self.profile())
            .bind(Namespace::Session, self.session())
            .bind(Namespace::Event, self.event.clone())
            .bind(Namespace::Flow, self.flow.clone())
            .bind(Namespace::Memory, self.memory.clone())
            .bind_value(Namespace::Payload, payload.clone())
    }

    pub fn log(&self, level: ConsoleLevel, message: impl Into<String>) {
        self.console.push(ConsoleEntry {
            flow_id: self.flow_id.clone(),
            node_id: self.node_id.clone(),
            event_id: self.event_id.clone(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(ConsoleLevel::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(ConsoleLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(ConsoleLevel::Error, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::dot::entity::read;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            "flow-1",
            "event-1",
            EntityCell::new(json!({"id": "p1"})),
            EntityCell::new(json!({"id": "s1"})),
            entity(json!({"type": "page-view"})),
        )
    }

    #[test]
    fn test_accessor_sees_shared_profile() {
        let ctx = context().for_node("n1", None);
        let dot = ctx.accessor(&json!({"value": 1}));
        dot.set("profile@visits", json!(1)).unwrap();
        assert_eq!(read(&ctx.profile())["visits"], 1);
        assert_eq!(dot.get("flow@id").unwrap().into_value(), json!("flow-1"));
        assert_eq!(dot.get("payload@value").unwrap().into_value(), json!(1));
    }

    #[test]
    fn test_replace_profile_visible_to_other_nodes() {
        let base = context();
        let a = base.for_node("a", None);
        let b = base.for_node("b", Some("e1"));
        a.replace_profile(json!({"id": "p2"}));
        assert_eq!(read(&b.profile())["id"], "p2");
        assert_eq!(b.in_edge.as_deref(), Some("e1"));
    }

    #[test]
    fn test_metrics_shared_between_nodes() {
        let base = context();
        base.for_node("a", None).set_metric("scored", json!(1));
        base.for_node("b", None).set_metric("routed", json!("vip"));
        assert_eq!(*read(base.metrics()), json!({"scored": 1, "routed": "vip"}));
    }

    #[test]
    fn test_console_collects_entries() {
        let ctx = context().for_node("n1", None);
        ctx.info("hello");
        ctx.error("boom");
        let entries = ctx.console().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, ConsoleLevel::Error);
        assert_eq!(entries[0].node_id, "n1");
    }
}
