// SPDX-License-Identifier: MIT

//! Typed error handling for the flow engine
//!
//! Each subsystem has its own error enum; `FlowError` wraps them all for
//! callers that do not care which layer failed.

use thiserror::Error;

/// Top-level error type for eventflow-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed graph, rejected before any event is processed
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Node construction or execution failure
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Condition parse or evaluation failure
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Dot-path lookup or write failure
    #[error("Accessor error: {0}")]
    Accessor(#[from] AccessorError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Graph compilation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("Duplicate edge id '{0}'")]
    DuplicateEdge(String),

    #[error("Edge '{edge_id}' references unknown node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Edge '{edge_id}' references unknown port '{port}' on node '{node_id}'")]
    UnknownPort {
        edge_id: String,
        node_id: String,
        port: String,
    },

    #[error("Node '{node_id}' declares {count} input ports, at most one is allowed")]
    TooManyInputs { node_id: String, count: usize },

    #[error("Circular dependency detected: {0:?}")]
    Cycle(Vec<String>),
}

/// Errors raised by action runners and their construction
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("Action '{module}.{class_name}' is not registered")]
    NotRegistered { module: String, class_name: String },

    #[error("Node '{node_id}' failed to initialize: {message}")]
    Initialization { node_id: String, message: String },

    #[error("Node '{node_id}' returned invalid output: {message}")]
    InvalidOutput { node_id: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Runtime(String),

    #[error(transparent)]
    Accessor(#[from] AccessorError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

impl ActionError {
    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Condition language errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Function '{function}' received a missing value")]
    MissingArgument { function: String },

    #[error("Function '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,
}

impl ExpressionError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Dot-notation accessor errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessorError {
    #[error("Field '{0}' does not exist")]
    MissingField(String),

    #[error("Namespace '{0}' is not bound")]
    Unbound(String),

    #[error("Namespace '{0}' is read-only")]
    ReadOnly(String),

    #[error("Invalid dot path '{0}'")]
    InvalidPath(String),

    #[error("Cannot descend into '{path}': value is not a container")]
    NotAContainer { path: String },
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
