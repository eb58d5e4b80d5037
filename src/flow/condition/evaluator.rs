// SPDX-License-Identifier: MIT

//! Condition expression evaluator
//!
//! Fields that cannot be resolved evaluate to `Operand::Missing` instead of
//! failing. The sentinel makes comparisons false and arithmetic neutral, and
//! is only an error when passed into a function.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::ast::{ArithmeticOp, CompareOp, Expression, Field};
use super::functions;
use crate::flow::dot::DotAccessor;
use crate::flow::error::ExpressionError;

/// Result of evaluating a sub-expression
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// A referenced field could not be resolved
    Missing,
}

impl Operand {
    pub fn is_missing(&self) -> bool {
        matches!(self, Operand::Missing)
    }

    /// Truthiness; the sentinel is never true
    pub fn is_truthy(&self) -> bool {
        match self {
            Operand::Missing => false,
            Operand::Value(v) => truthy(v),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Missing => None,
        }
    }
}

/// Evaluate a condition to a boolean. An unresolved result counts as false.
pub fn evaluate(expr: &Expression, accessor: &DotAccessor) -> Result<bool, ExpressionError> {
    Ok(evaluate_operand(expr, accessor)?.is_truthy())
}

/// Evaluate an expression, keeping the missing-value sentinel visible
pub fn evaluate_operand(
    expr: &Expression,
    accessor: &DotAccessor,
) -> Result<Operand, ExpressionError> {
    Evaluator {
        accessor,
        fields: HashMap::new(),
    }
    .eval(expr)
}

struct Evaluator<'a> {
    accessor: &'a DotAccessor,
    /// Memoized field lookups, keyed by source text
    fields: HashMap<String, Operand>,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expression) -> Result<Operand, ExpressionError> {
        match expr {
            Expression::Literal(v) => Ok(Operand::Value(v.clone())),
            Expression::Field(field) => Ok(self.field(field)),
            Expression::Compare { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(boolean(match (left, right) {
                    (Operand::Value(l), Operand::Value(r)) => compare(&l, *op, &r),
                    _ => false,
                }))
            }
            Expression::Between { value, low, high } => {
                let value = self.eval(value)?;
                let low = self.eval(low)?;
                let high = self.eval(high)?;
                Ok(boolean(match (value, low, high) {
                    (Operand::Value(v), Operand::Value(lo), Operand::Value(hi)) => {
                        matches!(order(&v, &lo), Some(Ordering::Greater | Ordering::Equal))
                            && matches!(order(&v, &hi), Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => false,
                }))
            }
            Expression::Exists { operand, negated } => {
                let present = !self.eval(operand)?.is_missing();
                Ok(boolean(present != *negated))
            }
            Expression::IsNull { operand, negated } => {
                let null = match self.eval(operand)? {
                    Operand::Missing => true,
                    Operand::Value(v) => v.is_null(),
                };
                Ok(boolean(null != *negated))
            }
            Expression::Empty { operand, negated } => {
                let empty = match self.eval(operand)? {
                    Operand::Missing => true,
                    Operand::Value(v) => is_empty(&v),
                };
                Ok(boolean(empty != *negated))
            }
            Expression::Arithmetic { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                arithmetic(*op, left, right)
            }
            Expression::Function { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match self.eval(arg)? {
                        Operand::Value(v) => values.push(v),
                        Operand::Missing => {
                            return Err(ExpressionError::MissingArgument {
                                function: name.clone(),
                            })
                        }
                    }
                }
                functions::call(name, &values).map(Operand::Value)
            }
            Expression::And(left, right) => {
                let left = self.eval(left)?;
                if left.is_missing() {
                    return Ok(Operand::Missing);
                }
                if !left.is_truthy() {
                    return Ok(boolean(false));
                }
                match self.eval(right)? {
                    Operand::Missing => Ok(Operand::Missing),
                    right => Ok(boolean(right.is_truthy())),
                }
            }
            Expression::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(boolean(true));
                }
                let right = self.eval(right)?;
                if left.is_missing() && right.is_missing() {
                    return Ok(Operand::Missing);
                }
                Ok(boolean(right.is_truthy()))
            }
            Expression::Not(inner) => match self.eval(inner)? {
                Operand::Missing => Ok(Operand::Missing),
                value => Ok(boolean(!value.is_truthy())),
            },
        }
    }

    fn field(&mut self, field: &Field) -> Operand {
        if let Some(cached) = self.fields.get(&field.raw) {
            return cached.clone();
        }
        let operand = match self.accessor.get_path(&field.path) {
            Ok(v) => Operand::Value(v),
            Err(_) => Operand::Missing,
        };
        self.fields.insert(field.raw.clone(), operand.clone());
        operand
    }
}

fn boolean(b: bool) -> Operand {
    Operand::Value(Value::Bool(b))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Lte => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Contains => contains(left, right),
        CompareOp::StartsWith => match (left, right) {
            (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        CompareOp::EndsWith => match (left, right) {
            (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
            _ => false,
        },
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => order(left, right) == Some(Ordering::Equal),
        (Value::String(a), Value::String(b)) => {
            a == b
                || matches!(
                    (functions::parse_datetime(a), functions::parse_datetime(b)),
                    (Some(x), Some(y)) if x == y
                )
        }
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => {
            match (functions::parse_datetime(a), functions::parse_datetime(b)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => Some(a.cmp(b)),
            }
        }
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn arithmetic(op: ArithmeticOp, left: Operand, right: Operand) -> Result<Operand, ExpressionError> {
    let (left, right) = match (left, right) {
        (Operand::Value(l), Operand::Value(r)) => (l, r),
        (Operand::Missing, Operand::Missing) => return Ok(Operand::Value(Value::from(0))),
        (Operand::Value(v), Operand::Missing) | (Operand::Missing, Operand::Value(v)) => {
            return Ok(Operand::Value(match op {
                ArithmeticOp::Add | ArithmeticOp::Sub => v,
                ArithmeticOp::Mul | ArithmeticOp::Div => Value::from(0),
            }))
        }
    };

    if let (ArithmeticOp::Add, Value::String(a), Value::String(b)) = (op, &left, &right) {
        return Ok(Operand::Value(Value::String(format!("{}{}", a, b))));
    }

    let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
        return Err(ExpressionError::Type(format!(
            "cannot apply '{}' to {} and {}",
            op, left, right
        )));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            ArithmeticOp::Add => x.checked_add(y),
            ArithmeticOp::Sub => x.checked_sub(y),
            ArithmeticOp::Mul => x.checked_mul(y),
            ArithmeticOp::Div if y == 0 => return Err(ExpressionError::DivisionByZero),
            ArithmeticOp::Div => match x.checked_rem(y) {
                Some(0) => x.checked_div(y),
                _ => None,
            },
        };
        if let Some(result) = exact {
            return Ok(Operand::Value(Value::from(result)));
        }
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(ExpressionError::Type("non-finite number".to_string())),
    };
    let result = match op {
        ArithmeticOp::Add => x + y,
        ArithmeticOp::Sub => x - y,
        ArithmeticOp::Mul => x * y,
        ArithmeticOp::Div if y == 0.0 => return Err(ExpressionError::DivisionByZero),
        ArithmeticOp::Div => x / y,
    };
    Ok(Operand::Value(Value::from(result)))
}
