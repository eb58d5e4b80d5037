// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::runner::ActionRunner;
use crate::flow::error::ActionError;

type Factory = Arc<dyn Fn() -> Box<dyn ActionRunner> + Send + Sync>;

/// Maps `(module, class_name)` pairs to action constructors
#[derive(Clone)]
pub struct ActionRegistry {
    factories: Arc<RwLock<HashMap<(String, String), Factory>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register<F, R>(&self, module: &str, class_name: &str, factory: F)
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: ActionRunner + 'static,
    {
        let mut factories = self.factories.write().await;
        factories.insert(
            (module.to_string(), class_name.to_string()),
            Arc::new(move || Box::new(factory()) as Box<dyn ActionRunner>),
        );
    }

    pub async fn contains(&self, module: &str, class_name: &str) -> bool {
        let factories = self.factories.read().await;
        factories.contains_key(&(module.to_string(), class_name.to_string()))
    }

    /// Build a runner and configure it with `init`
    pub async fn construct(
        &self,
        module: &str,
        class_name: &str,
        init: Value,
    ) -> Result<Box<dyn ActionRunner>, ActionError> {
        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(&(module.to_string(), class_name.to_string()))
                .cloned()
                .ok_or_else(|| ActionError::NotRegistered {
                    module: module.to_string(),
                    class_name: class_name.to_string(),
                })?
        };

        let mut runner = factory();
        runner.set_up(init).await?;
        Ok(runner)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
