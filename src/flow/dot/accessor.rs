// SPDX-License-Identifier: MIT

//! Path-addressable read/write view over the bound entities

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::entity::{self, Entity};
use super::path::{DotPath, Namespace};
use crate::flow::error::AccessorError;

/// Outcome of a `get` call
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The string was a dot path and it resolved to this value
    Value(Value),
    /// The string is not a dot path at all; returned unchanged
    NotAPath(String),
}

impl Resolved {
    /// The resolved value, or the original string as a JSON string
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Value(v) => v,
            Resolved::NotAPath(s) => Value::String(s),
        }
    }
}

/// Dot-notation accessor bound to up to six entities
#[derive(Debug, Clone, Default)]
pub struct DotAccessor {
    entities: HashMap<Namespace, Entity>,
}

impl DotAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a namespace to a shared entity
    pub fn bind(mut self, namespace: Namespace, entity: Entity) -> Self {
        self.entities.insert(namespace, entity);
        self
    }

    /// Bind a namespace to a private copy of `value`
    pub fn bind_value(self, namespace: Namespace, value: Value) -> Self {
        self.bind(namespace, entity::entity(value))
    }

    pub fn entity(&self, namespace: Namespace) -> Option<&Entity> {
        self.entities.get(&namespace)
    }

    /// Resolve `path`. Strings that are not dot paths come back unchanged as
    /// `Resolved::NotAPath`; recognised paths that cannot be resolved fail.
    pub fn get(&self, path: &str) -> Result<Resolved, AccessorError> {
        match DotPath::parse(path) {
            None => Ok(Resolved::NotAPath(path.to_string())),
            Some(dot) => self.get_path(&dot).map(Resolved::Value),
        }
    }

    /// Resolve an already parsed path
    pub fn get_path(&self, path: &DotPath) -> Result<Value, AccessorError> {
        let entity = self
            .entities
            .get(&path.namespace)
            .ok_or_else(|| AccessorError::Unbound(path.namespace.to_string()))?;

        let guard = entity::read(entity);
        let mut current: &Value = &guard;
        for segment in &path.segments {
            current = step(current, segment).ok_or_else(|| missing(path))?;
        }

        let value = current.clone();
        Ok(if path.coerce { coerce(value) } else { value })
    }

    /// Resolve `input` if it is a path, otherwise return it as a string value
    pub fn resolve_or_literal(&self, input: &str) -> Result<Value, AccessorError> {
        self.get(input).map(Resolved::into_value)
    }

    /// True iff `get(path)` would succeed with a resolved value
    pub fn contains(&self, path: &str) -> bool {
        matches!(self.get(path), Ok(Resolved::Value(_)))
    }

    /// Write `value` at `path`. A string value that is itself a resolvable
    /// path is replaced by what it resolves to before the write.
    pub fn set(&self, path: &str, value: Value) -> Result<(), AccessorError> {
        let dot = DotPath::parse(path).ok_or_else(|| AccessorError::InvalidPath(path.to_string()))?;

        let substituted = match &value {
            Value::String(s) => match self.get(s) {
                Ok(Resolved::Value(resolved)) => Some(resolved),
                _ => None,
            },
            _ => None,
        };
        let value = substituted.unwrap_or(value);

        self.set_path(&dot, value)
    }

    /// Write to an already parsed path, creating intermediate objects
    pub fn set_path(&self, path: &DotPath, value: Value) -> Result<(), AccessorError> {
        if path.namespace.is_read_only() {
            return Err(AccessorError::ReadOnly(path.namespace.to_string()));
        }
        let entity = self
            .entities
            .get(&path.namespace)
            .ok_or_else(|| AccessorError::Unbound(path.namespace.to_string()))?;

        let mut guard = entity::write(entity);
        let Some((last, parents)) = path.segments.split_last() else {
            *guard = value;
            return Ok(());
        };

        let mut current: &mut Value = &mut guard;
        for segment in parents {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(map) => map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(move |i| items.get_mut(i))
                    .ok_or_else(|| missing(path))?,
                _ => {
                    return Err(AccessorError::NotAContainer {
                        path: path.to_string(),
                    })
                }
            };
        }

        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(move |i| items.get_mut(i))
                    .ok_or_else(|| missing(path))?;
                *slot = value;
                Ok(())
            }
            _ => Err(AccessorError::NotAContainer {
                path: path.to_string(),
            }),
        }
    }

    /// Remove the value at `path`, returning it
    pub fn delete(&self, path: &str) -> Result<Value, AccessorError> {
        let dot = DotPath::parse(path).ok_or_else(|| AccessorError::InvalidPath(path.to_string()))?;
        if dot.namespace.is_read_only() {
            return Err(AccessorError::ReadOnly(dot.namespace.to_string()));
        }
        let entity = self
            .entities
            .get(&dot.namespace)
            .ok_or_else(|| AccessorError::Unbound(dot.namespace.to_string()))?;

        let mut guard = entity::write(entity);
        let Some((last, parents)) = dot.segments.split_last() else {
            return Ok(std::mem::take(&mut *guard));
        };

        let mut current: &mut Value = &mut guard;
        for segment in parents {
            current = step_mut(current, segment).ok_or_else(|| missing(&dot))?;
        }

        match current {
            Value::Object(map) => map.remove(last).ok_or_else(|| missing(&dot)),
            Value::Array(items) => match last.parse::<usize>() {
                Ok(i) if i < items.len() => Ok(items.remove(i)),
                _ => Err(missing(&dot)),
            },
            _ => Err(missing(&dot)),
        }
    }
}

fn missing(path: &DotPath) -> AccessorError {
    AccessorError::MissingField(path.to_string())
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Turn string representations into typed values
pub fn coerce(value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };
    let text = s.trim();
    match text.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    value
}
