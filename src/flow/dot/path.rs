// SPDX-License-Identifier: MIT

//! Dot-path parsing (`namespace@a.b.c`)

use std::fmt;

/// Entities a dot path can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Profile,
    Session,
    Payload,
    Event,
    Flow,
    Memory,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Profile,
        Namespace::Session,
        Namespace::Payload,
        Namespace::Event,
        Namespace::Flow,
        Namespace::Memory,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "profile" => Some(Namespace::Profile),
            "session" => Some(Namespace::Session),
            "payload" => Some(Namespace::Payload),
            "event" => Some(Namespace::Event),
            "flow" => Some(Namespace::Flow),
            "memory" => Some(Namespace::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Profile => "profile",
            Namespace::Session => "session",
            Namespace::Payload => "payload",
            Namespace::Event => "event",
            Namespace::Flow => "flow",
            Namespace::Memory => "memory",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Namespace::Flow)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed dot path
#[derive(Debug, Clone, PartialEq)]
pub struct DotPath {
    pub namespace: Namespace,
    /// Empty when the path addresses the whole namespace (`profile@...`)
    pub segments: Vec<String>,
    /// Backtick-quoted paths coerce string values into typed ones
    pub coerce: bool,
}

impl DotPath {
    /// Parse a string as a dot path. Returns `None` when the string is not
    /// a recognised path, which callers treat as a plain literal.
    pub fn parse(input: &str) -> Option<DotPath> {
        let trimmed = input.trim();
        let (body, coerce) = match trimmed
            .strip_prefix('`')
            .and_then(|s| s.strip_suffix('`'))
        {
            Some(inner) => (inner.trim(), true),
            None => (trimmed, false),
        };

        let (name, path) = body.split_once('@')?;
        let namespace = Namespace::from_name(name)?;

        if path == "..." {
            return Some(DotPath {
                namespace,
                segments: vec![],
                coerce,
            });
        }

        if path.is_empty() {
            return None;
        }

        let segments: Vec<String> = path.split('.').map(|s| s.to_string()).collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || s.chars().any(char::is_whitespace))
        {
            return None;
        }

        Some(DotPath {
            namespace,
            segments,
            coerce,
        })
    }

    pub fn is_whole_namespace(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.segments.is_empty() {
            "...".to_string()
        } else {
            self.segments.join(".")
        };
        if self.coerce {
            write!(f, "`{}@{}`", self.namespace, path)
        } else {
            write!(f, "{}@{}", self.namespace, path)
        }
    }
}
