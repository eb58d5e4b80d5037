// SPDX-License-Identifier: MIT

//! Constructed node runners
//!
//! Each node is constructed and set up at most once per cache. A node whose
//! construction failed stays poisoned and reports the same error on every
//! later walk without another attempt.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::flow::action::{ActionRegistry, ActionRunner};
use crate::flow::error::ActionError;
use crate::flow::graph::NodeDefinition;

#[derive(Clone)]
pub(crate) enum NodeInstance {
    Ready(Arc<dyn ActionRunner>),
    /// Construction or `set_up` failed; every call fails with this error
    Poisoned(ActionError),
}

#[derive(Default)]
pub struct NodeInstances {
    nodes: Mutex<HashMap<String, NodeInstance>>,
}

impl NodeInstances {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached instance of `node`, constructing it on first use
    pub(crate) async fn get_or_construct(
        &self,
        node: &NodeDefinition,
        registry: &ActionRegistry,
    ) -> NodeInstance {
        let mut nodes = self.nodes.lock().await;
        if let Some(instance) = nodes.get(&node.id) {
            return instance.clone();
        }

        let instance = match registry
            .construct(&node.module, &node.class_name, node.init.clone())
            .await
        {
            Ok(runner) => NodeInstance::Ready(Arc::from(runner)),
            Err(e) => {
                log::error!("Node {} could not be initialized: {}", node.id, e);
                NodeInstance::Poisoned(ActionError::Initialization {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                })
            }
        };
        nodes.insert(node.id.clone(), instance.clone());
        instance
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every constructed runner and forget all nodes, poisoned ones
    /// included. Runners still held by a walk in progress are dropped
    /// without `close`.
    pub async fn close(&self) {
        let drained: Vec<_> = self.nodes.lock().await.drain().collect();
        for (node_id, instance) in drained {
            if let NodeInstance::Ready(mut runner) = instance {
                match Arc::get_mut(&mut runner) {
                    Some(runner) => {
                        log::debug!("Closing node {}", node_id);
                        runner.close().await;
                    }
                    None => log::warn!("Node {} is still running, not closed", node_id),
                }
            }
        }
    }
}
