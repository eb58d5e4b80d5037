// SPDX-License-Identifier: MIT

//! Built-in actions
//!
//! Registered under the `builtin` module name:
//! - `start` / `end` - entry and terminal nodes
//! - `if` - routes the payload to its `true` or `false` port
//! - `increment` / `set_value` / `reshape` - profile and payload edits
//! - `log` - writes to the walk console

mod console;
mod control;
mod data;

pub use console::LogAction;
pub use control::{EndAction, IfAction, StartAction};
pub use data::{IncrementAction, ReshapeAction, SetValueAction};

use crate::flow::action::ActionRegistry;

pub const BUILTIN_MODULE: &str = "builtin";

/// Register every built-in action on `registry`
pub async fn register_builtins(registry: &ActionRegistry) {
    registry.register(BUILTIN_MODULE, "start", StartAction::default).await;
    registry.register(BUILTIN_MODULE, "end", EndAction::default).await;
    registry.register(BUILTIN_MODULE, "if", IfAction::default).await;
    registry
        .register(BUILTIN_MODULE, "increment", IncrementAction::default)
        .await;
    registry
        .register(BUILTIN_MODULE, "set_value", SetValueAction::default)
        .await;
    registry
        .register(BUILTIN_MODULE, "reshape", ReshapeAction::default)
        .await;
    registry.register(BUILTIN_MODULE, "log", LogAction::default).await;
    log::debug!("Registered built-in actions");
}

impl ActionRegistry {
    /// A registry holding the built-in actions
    pub async fn with_builtins() -> Self {
        let registry = Self::new();
        register_builtins(&registry).await;
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_builtins() {
        let registry = ActionRegistry::with_builtins().await;
        for name in ["start", "end", "if", "increment", "set_value", "reshape", "log"] {
            assert!(registry.contains(BUILTIN_MODULE, name).await, "{}", name);
        }
        assert!(!registry.contains(BUILTIN_MODULE, "missing").await);
    }
}
