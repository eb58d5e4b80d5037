// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for condition expressions

use serde_json::Value;

use crate::flow::dot::DotPath;

/// A condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value: string, number, boolean or null
    Literal(Value),
    /// Dot-path reference, resolved lazily at evaluation time
    Field(Field),
    /// Binary comparison: left op right
    Compare {
        left: Box<Expression>,
        op: CompareOp,
        right: Box<Expression>,
    },
    /// value between low and high (inclusive)
    Between {
        value: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },
    /// `x exists` / `x not exists`
    Exists { operand: Box<Expression>, negated: bool },
    /// `x is null` / `x is not null`
    IsNull { operand: Box<Expression>, negated: bool },
    /// `x empty` / `x not empty`
    Empty { operand: Box<Expression>, negated: bool },
    /// Arithmetic: left op right
    Arithmetic {
        left: Box<Expression>,
        op: ArithmeticOp,
        right: Box<Expression>,
    },
    /// Function call, e.g. `datetime.offset(x, "-1d")`
    Function { name: String, args: Vec<Expression> },
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
}

/// A dot-path reference inside an expression
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Source text, used as the memoization key
    pub raw: String,
    pub path: DotPath,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Contains => write!(f, "contains"),
            CompareOp::StartsWith => write!(f, "starts with"),
            CompareOp::EndsWith => write!(f, "ends with"),
        }
    }
}

impl std::fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArithmeticOp::Add => write!(f, "+"),
            ArithmeticOp::Sub => write!(f, "-"),
            ArithmeticOp::Mul => write!(f, "*"),
            ArithmeticOp::Div => write!(f, "/"),
        }
    }
}
