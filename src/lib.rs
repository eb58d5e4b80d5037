// SPDX-License-Identifier: MIT

//! Event-driven workflow engine for customer tracking.
//!
//! - `flow` - the graph engine: dot-path accessor, condition language,
//!   graph model, action contract and the invoker that walks a graph per event
//! - `tracker` - the surrounding platform pieces: identity lock, config,
//!   workflow loading and the built-in actions

pub mod flow;
pub mod tracker;
