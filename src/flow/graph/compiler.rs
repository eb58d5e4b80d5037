// SPDX-License-Identifier: MIT

//! Flow compilation
//!
//! Validates a [`FlowDefinition`] once and precomputes the adjacency and
//! visitation order the invoker walks for every event.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::types::{EdgeDefinition, FlowDefinition, NodeDefinition};
use crate::flow::error::CompileError;

/// A validated flow with precomputed adjacency
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    definition: FlowDefinition,
    index: HashMap<String, usize>,
    incoming: HashMap<String, Vec<EdgeDefinition>>,
    outgoing: HashMap<String, Vec<EdgeDefinition>>,
    order: Vec<String>,
    start_nodes: Vec<String>,
}

impl CompiledGraph {
    pub fn compile(definition: &FlowDefinition) -> Result<Self, CompileError> {
        let mut index = HashMap::new();
        for (i, node) in definition.nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(CompileError::DuplicateNode(node.id.clone()));
            }
            if node.inputs.len() > 1 {
                return Err(CompileError::TooManyInputs {
                    node_id: node.id.clone(),
                    count: node.inputs.len(),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut incoming: HashMap<String, Vec<EdgeDefinition>> = HashMap::new();
        let mut outgoing: HashMap<String, Vec<EdgeDefinition>> = HashMap::new();

        for edge in &definition.edges {
            if !seen.insert(edge.id.as_str()) {
                return Err(CompileError::DuplicateEdge(edge.id.clone()));
            }

            let source = lookup(definition, &index, edge, &edge.source.node_id)?;
            if !source.outputs.contains(&edge.source.port) {
                return Err(CompileError::UnknownPort {
                    edge_id: edge.id.clone(),
                    node_id: source.id.clone(),
                    port: edge.source.port.clone(),
                });
            }

            let target = lookup(definition, &index, edge, &edge.target.node_id)?;
            if target.input_port() != Some(edge.target.port.as_str()) && !target.start {
                return Err(CompileError::UnknownPort {
                    edge_id: edge.id.clone(),
                    node_id: target.id.clone(),
                    port: edge.target.port.clone(),
                });
            }

            if !edge.enabled {
                continue;
            }
            outgoing
                .entry(source.id.clone())
                .or_default()
                .push(edge.clone());
            // Start nodes are fed by the event, never by edges
            if !target.start {
                incoming
                    .entry(target.id.clone())
                    .or_default()
                    .push(edge.clone());
            }
        }

        let order = topological_order(definition, &index, &incoming)?;
        let start_nodes = definition
            .nodes
            .iter()
            .filter(|n| n.start)
            .map(|n| n.id.clone())
            .collect();

        log::debug!(
            "Compiled flow '{}': {} nodes, {} edges, order {:?}",
            definition.id,
            definition.nodes.len(),
            definition.edges.len(),
            order
        );

        Ok(Self {
            definition: definition.clone(),
            index,
            incoming,
            outgoing,
            order,
            start_nodes,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.index.get(id).map(|i| &self.definition.nodes[*i])
    }

    /// Enabled edges feeding `node_id`, in definition order
    pub fn incoming(&self, node_id: &str) -> &[EdgeDefinition] {
        self.incoming.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Enabled edges leaving `node_id`, in definition order
    pub fn outgoing(&self, node_id: &str) -> &[EdgeDefinition] {
        self.outgoing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Node ids in visitation order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn start_nodes(&self) -> &[String] {
        &self.start_nodes
    }

    pub fn is_start(&self, node_id: &str) -> bool {
        self.start_nodes.iter().any(|id| id == node_id)
    }
}

fn lookup<'a>(
    definition: &'a FlowDefinition,
    index: &HashMap<String, usize>,
    edge: &EdgeDefinition,
    node_id: &str,
) -> Result<&'a NodeDefinition, CompileError> {
    index
        .get(node_id)
        .map(|i| &definition.nodes[*i])
        .ok_or_else(|| CompileError::DanglingEdge {
            edge_id: edge.id.clone(),
            node_id: node_id.to_string(),
        })
}

/// Kahn's algorithm, ties broken by definition order
fn topological_order(
    definition: &FlowDefinition,
    index: &HashMap<String, usize>,
    incoming: &HashMap<String, Vec<EdgeDefinition>>,
) -> Result<Vec<String>, CompileError> {
    let nodes = &definition.nodes;
    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|n| incoming.get(&n.id).map(Vec::len).unwrap_or(0))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edges in incoming.values() {
        for edge in edges {
            if let (Some(s), Some(t)) = (
                index.get(&edge.source.node_id),
                index.get(&edge.target.node_id),
            ) {
                successors[*s].push(*t);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(current) = ready.pop_first() {
        order.push(nodes[current].id.clone());
        for next in &successors[current] {
            in_degree[*next] -= 1;
            if in_degree[*next] == 0 {
                ready.insert(*next);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(CompileError::Cycle(stuck));
    }

    Ok(order)
}
