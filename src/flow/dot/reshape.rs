// SPDX-License-Identifier: MIT

//! Template reshaping
//!
//! Walks a nested template and replaces every string leaf that is a dot
//! path with the value it resolves to. Keys ending in `?` are optional and
//! silently dropped when anything below them fails to resolve.

use serde_json::{Map, Value};

use super::accessor::{DotAccessor, Resolved};
use crate::flow::error::AccessorError;

/// How unresolved non-optional paths are handled
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapeOptions {
    /// Fail on the first unresolved path
    pub strict: bool,
    /// Value written in place of an unresolved path when not strict
    pub default: Value,
}

impl Default for ReshapeOptions {
    fn default() -> Self {
        Self {
            strict: false,
            default: Value::Null,
        }
    }
}

impl ReshapeOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            default: Value::Null,
        }
    }
}

impl DotAccessor {
    /// Reshape `template` against the bound entities
    pub fn reshape(&self, template: &Value, options: &ReshapeOptions) -> Result<Value, AccessorError> {
        reshape_value(self, template, options)
    }
}

fn reshape_value(
    dot: &DotAccessor,
    template: &Value,
    options: &ReshapeOptions,
) -> Result<Value, AccessorError> {
    match template {
        Value::String(s) => match dot.get(s) {
            Ok(Resolved::Value(v)) => Ok(v),
            Ok(Resolved::NotAPath(s)) => Ok(Value::String(s)),
            Err(e) if options.strict => Err(e),
            Err(_) => Ok(options.default.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| reshape_value(dot, item, options))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                match key.strip_suffix('?') {
                    Some(optional) => {
                        if let Ok(v) = reshape_value(dot, value, &ReshapeOptions::strict()) {
                            out.insert(optional.to_string(), v);
                        }
                    }
                    None => {
                        out.insert(key.clone(), reshape_value(dot, value, options)?);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
