// SPDX-License-Identifier: MIT

//! Debug trace of a walk, serialisable for an external viewer

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::flow::action::ActionResult;
use crate::flow::graph::NodeDefinition;

/// One `run` call, or a pass-through that stood in for one
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Seconds
    pub run_time: f64,
    pub in_edge: Option<String>,
    pub input: Value,
    pub outputs: Vec<ActionResult>,
    pub error: Option<String>,
    /// The node was not run; a void result was forwarded
    pub void: bool,
    /// The run-once gate turned the call into a no-op
    pub suppressed: bool,
}

impl CallRecord {
    pub fn new(start: DateTime<Utc>, in_edge: Option<String>, input: Value) -> Self {
        let end = Utc::now();
        Self {
            start,
            end,
            run_time: seconds_between(start, end),
            in_edge,
            input,
            outputs: Vec::new(),
            error: None,
            void: false,
            suppressed: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start)
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeTrace {
    pub node_id: String,
    pub name: String,
    pub module: String,
    pub class_name: String,
    pub remote: bool,
    pub calls: Vec<CallRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugTrace {
    pub flow_id: String,
    pub event_id: String,
    pub nodes: Vec<NodeTrace>,
}

impl DebugTrace {
    pub fn new(flow_id: &str, event_id: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            event_id: event_id.to_string(),
            nodes: Vec::new(),
        }
    }

    /// Append a call record under `node`, creating its entry on first use
    pub fn record(&mut self, node: &NodeDefinition, call: CallRecord) {
        let position = match self.nodes.iter().position(|n| n.node_id == node.id) {
            Some(position) => position,
            None => {
                self.nodes.push(NodeTrace {
                    node_id: node.id.clone(),
                    name: node.name.clone(),
                    module: node.module.clone(),
                    class_name: node.class_name.clone(),
                    remote: node.remote,
                    calls: Vec::new(),
                });
                self.nodes.len() - 1
            }
        };
        self.nodes[position].calls.push(call);
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeTrace> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn has_errors(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.calls.iter().any(CallRecord::is_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_groups_calls_by_node() {
        let node = NodeDefinition::new("a", "builtin", "log");
        let mut trace = DebugTrace::new("flow-1", "event-1");
        trace.record(&node, CallRecord::new(Utc::now(), None, json!({})));
        trace.record(&node, CallRecord::new(Utc::now(), Some("e1".into()), json!(1)));

        assert_eq!(trace.nodes.len(), 1);
        assert_eq!(trace.node("a").unwrap().calls.len(), 2);
        assert!(!trace.has_errors());
    }

    #[test]
    fn test_trace_serializes() {
        let node = NodeDefinition::new("a", "builtin", "log");
        let mut trace = DebugTrace::new("flow-1", "event-1");
        let mut call = CallRecord::new(Utc::now(), None, json!({}));
        call.error = Some("boom".to_string());
        trace.record(&node, call);

        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["nodes"][0]["calls"][0]["error"], "boom");
        assert!(trace.has_errors());
    }
}
