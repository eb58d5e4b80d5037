// SPDX-License-Identifier: MIT

//! Graph invoker
//!
//! This module provides:
//! - `GraphInvoker` - walks a compiled flow once per event
//! - `ActionsResults` - per-edge queues between nodes
//! - `NodeInstances` - constructed runners, poisoned nodes included
//! - `RunOnceGate` - time-windowed suppression of repeated node calls
//! - `DebugTrace` - optional per-call records of a walk

mod engine;
pub mod instances;
pub mod results;
pub mod run_once;
pub mod trace;

pub use engine::{FlowInput, FlowOutcome, GraphInvoker, NodeFailure};
pub use instances::NodeInstances;
pub use results::{ActionsResults, EdgePayload};
pub use run_once::RunOnceGate;
pub use trace::{CallRecord, DebugTrace, NodeTrace};
