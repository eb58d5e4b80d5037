// SPDX-License-Identifier: MIT

//! Flow graph model and compilation

pub mod compiler;
pub mod types;

pub use compiler::CompiledGraph;
pub use types::{
    EdgeDefinition, EdgeEnd, FlowDefinition, JoinSettings, NodeDefinition, RunOnce, RunOnceKind,
    DEFAULT_PORT,
};
