// SPDX-License-Identifier: MIT

//! Flow definition types
//!
//! A flow is a list of nodes wired together by edges running from a named
//! output port to the single input port of the target node.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Port name used when a node does not declare its ports
pub const DEFAULT_PORT: &str = "payload";

fn default_ports() -> Vec<String> {
    vec![DEFAULT_PORT.to_string()]
}

fn default_true() -> bool {
    true
}

/// A workflow: nodes plus the edges between them
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FlowDefinition {
    /// Unique identifier of the flow
    pub id: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Nodes, in definition order
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// One executable step of a flow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Action implementation reference
    pub module: String,
    pub class_name: String,
    /// Configuration handed to the action's `set_up`
    #[serde(default)]
    pub init: Value,
    /// Input ports. Only zero or one is valid.
    #[serde(default = "default_ports")]
    pub inputs: Vec<String>,
    /// Output ports
    #[serde(default = "default_ports")]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub start: bool,
    /// Only runs when the event is processed in debug mode
    #[serde(default)]
    pub debug: bool,
    /// Not executed; live input is forwarded unchanged
    #[serde(default)]
    pub skip: bool,
    /// Not executed and nothing is forwarded
    #[serde(default)]
    pub block_flow: bool,
    #[serde(default)]
    pub remote: bool,
    /// Merge the action output over its input payload
    #[serde(default)]
    pub append_input_payload: bool,
    #[serde(default)]
    pub run_once: Option<RunOnce>,
    #[serde(default)]
    pub join: Option<JoinSettings>,
}

/// Suppress repeated satisfying invocations within a time window
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunOnce {
    #[serde(rename = "type", default)]
    pub kind: RunOnceKind,
    /// Dot path or condition, depending on `kind`
    pub expression: String,
    /// Window length in seconds
    #[serde(default = "RunOnce::default_ttl")]
    pub ttl: u64,
}

impl RunOnce {
    fn default_ttl() -> u64 {
        60
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunOnceKind {
    /// Run when the resolved value differs from the last one seen
    #[default]
    Value,
    /// Run on the first time the condition holds
    Condition,
}

/// Aggregate all inbound edge values of a round into one call
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct JoinSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per output port reshape template applied to the node output
    #[serde(default)]
    pub reshape: HashMap<String, Value>,
}

/// A directed connection between an output port and an input port
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeDefinition {
    pub id: String,
    pub source: EdgeEnd,
    pub target: EdgeEnd,
    /// Key used when a join node aggregates its inputs
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EdgeDefinition {
    /// Aggregation key: the edge name, falling back to its id
    pub fn key(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeEnd {
    pub node_id: String,
    #[serde(default = "EdgeEnd::default_port")]
    pub port: String,
}

impl EdgeEnd {
    fn default_port() -> String {
        DEFAULT_PORT.to_string()
    }
}

impl NodeDefinition {
    pub fn new(id: &str, module: &str, class_name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            module: module.to_string(),
            class_name: class_name.to_string(),
            init: Value::Null,
            inputs: default_ports(),
            outputs: default_ports(),
            start: false,
            debug: false,
            skip: false,
            block_flow: false,
            remote: false,
            append_input_payload: false,
            run_once: None,
            join: None,
        }
    }

    pub fn with_init(mut self, init: Value) -> Self {
        self.init = init;
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn as_start(mut self) -> Self {
        self.start = true;
        self
    }

    pub fn with_join(mut self, join: JoinSettings) -> Self {
        self.join = Some(join);
        self
    }

    pub fn is_join(&self) -> bool {
        self.join.as_ref().is_some_and(|j| j.enabled)
    }

    /// Input port name, if the node has one
    pub fn input_port(&self) -> Option<&str> {
        self.inputs.first().map(String::as_str)
    }
}

impl EdgeDefinition {
    /// Edge from `source.payload` to `target.payload`
    pub fn new(id: &str, source: &str, target: &str) -> Self {
        Self::between(id, (source, DEFAULT_PORT), target)
    }

    /// Edge from a named output port of `source`
    pub fn between(id: &str, source: (&str, &str), target: &str) -> Self {
        Self {
            id: id.to_string(),
            source: EdgeEnd {
                node_id: source.0.to_string(),
                port: source.1.to_string(),
            },
            target: EdgeEnd {
                node_id: target.to_string(),
                port: DEFAULT_PORT.to_string(),
            },
            name: None,
            enabled: true,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_defaults() {
        let yaml = r#"
            id: inc
            module: builtin
            class_name: increment
        "#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(node.inputs, vec!["payload".to_string()]);
        assert_eq!(node.outputs, vec!["payload".to_string()]);
        assert!(!node.start);
        assert!(node.run_once.is_none());
        assert!(!node.is_join());
    }

    #[test]
    fn test_run_once_deserialize() {
        let yaml = r#"
            id: once
            module: builtin
            class_name: log
            run_once:
              type: condition
              expression: "profile@stats.visits > 3"
              ttl: 30
        "#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        let run_once = node.run_once.unwrap();
        assert_eq!(run_once.kind, RunOnceKind::Condition);
        assert_eq!(run_once.ttl, 30);
    }

    #[test]
    fn test_join_deserialize() {
        let yaml = r#"
            id: merge
            module: builtin
            class_name: reshape
            join:
              reshape:
                payload:
                  left: "payload@b"
        "#;
        let node: NodeDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(node.is_join());
        assert_eq!(
            node.join.unwrap().reshape["payload"],
            json!({"left": "payload@b"})
        );
    }

    #[test]
    fn test_edge_key_falls_back_to_id() {
        let edge = EdgeDefinition::new("e1", "a", "b");
        assert_eq!(edge.key(), "e1");
        assert_eq!(edge.named("left").key(), "left");
    }

    #[test]
    fn test_edge_deserialize() {
        let json = json!({
            "id": "e1",
            "source": {"node_id": "if", "port": "true"},
            "target": {"node_id": "end"}
        });
        let edge: EdgeDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(edge.source.port, "true");
        assert_eq!(edge.target.port, "payload");
        assert!(edge.enabled);
    }
}
