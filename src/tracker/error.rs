// SPDX-License-Identifier: MIT

use thiserror::Error;

use super::lock::LockError;
use crate::flow::error::{CompileError, FlowError};

/// Errors surfaced by the tracker layer
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CompileError> for TrackerError {
    fn from(err: CompileError) -> Self {
        Self::Flow(FlowError::Compile(err))
    }
}
