// SPDX-License-Identifier: MIT

//! Per-edge result queues for one walk

use serde_json::Value;
use std::collections::HashMap;

/// What a target node receives from one queued entry
#[derive(Debug, Clone, PartialEq)]
pub enum EdgePayload {
    Value(Value),
    /// Upstream emitted an explicit `None` on the edge's port
    Void,
}

impl From<Option<Value>> for EdgePayload {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => EdgePayload::Value(v),
            None => EdgePayload::Void,
        }
    }
}

/// Queued values keyed by edge id.
///
/// An edge with no entry is dead for this walk. A `None` upstream result is
/// stored as `EdgePayload::Void`, never as absence.
#[derive(Debug, Default)]
pub struct ActionsResults {
    queues: HashMap<String, Vec<EdgePayload>>,
}

impl ActionsResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge_id: &str, payload: EdgePayload) {
        self.queues
            .entry(edge_id.to_string())
            .or_default()
            .push(payload);
    }

    /// Drain the queue of `edge_id`; `None` means the edge is dead
    pub fn take(&mut self, edge_id: &str) -> Option<Vec<EdgePayload>> {
        self.queues.remove(edge_id)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dead_edge_has_no_entry() {
        let mut results = ActionsResults::new();
        assert_eq!(results.take("e1"), None);
    }

    #[test]
    fn test_void_is_stored_explicitly() {
        let mut results = ActionsResults::new();
        results.push("e1", None.into());
        assert_eq!(results.take("e1"), Some(vec![EdgePayload::Void]));
    }

    #[test]
    fn test_take_drains_in_order() {
        let mut results = ActionsResults::new();
        results.push("e1", EdgePayload::Value(json!(1)));
        results.push("e1", EdgePayload::Value(json!(2)));
        assert_eq!(
            results.take("e1"),
            Some(vec![EdgePayload::Value(json!(1)), EdgePayload::Value(json!(2))])
        );
        assert!(results.is_empty());
        assert_eq!(results.take("e1"), None);
    }
}
