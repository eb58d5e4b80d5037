// SPDX-License-Identifier: MIT

//! Condition expression language
//!
//! Parses expressions such as `profile@stats.visits > 10 and payload@ok exists`
//! and evaluates them against a [`DotAccessor`](crate::flow::dot::DotAccessor).

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use ast::{ArithmeticOp, CompareOp, Expression, Field};
pub use evaluator::{evaluate, evaluate_operand, Operand};
pub use parser::parse;

use crate::flow::dot::DotAccessor;
use crate::flow::error::ExpressionError;

/// A parsed condition, ready to be evaluated any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expression: Expression,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.to_string(),
            expression: parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn evaluate(&self, accessor: &DotAccessor) -> Result<bool, ExpressionError> {
        evaluate(&self.expression, accessor)
    }
}
