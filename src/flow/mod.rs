// SPDX-License-Identifier: MIT

//! Flow engine: dot-path access, conditions, graph model, actions and the invoker

pub mod action;
pub mod condition;
pub mod dot;
pub mod error;
pub mod graph;
pub mod invoker;

pub use error::FlowError;
