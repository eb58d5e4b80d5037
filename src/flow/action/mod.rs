// SPDX-License-Identifier: MIT

//! Action runner contract
//!
//! This module provides:
//! - `ActionRunner` - the trait every node implementation satisfies
//! - `ExecutionContext` - shared walk state handed to each call
//! - `ActionRegistry` - `(module, class_name)` to constructor lookup

pub mod context;
pub mod registry;
pub mod runner;

pub use context::{ConsoleEntry, ConsoleLevel, ConsoleLog, ExecutionContext};
pub use registry::ActionRegistry;
pub use runner::{ActionOutput, ActionResult, ActionRunner};
