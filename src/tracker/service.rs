// SPDX-License-Identifier: MIT

//! Tracker facade
//!
//! Runs one compiled flow per incoming event while holding the profile's
//! identity lock, so walks for the same profile never overlap. Walks for
//! different profiles run in parallel on one shared invoker, so node
//! runners are constructed once for the tracker's lifetime.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::config::TrackerConfig;
use super::error::TrackerError;
use super::lock::{InMemoryStore, KeyValueStore, Synchronizer};
use super::redis_store::RedisStore;
use crate::flow::action::ActionRegistry;
use crate::flow::dot::entity::read;
use crate::flow::graph::{CompiledGraph, FlowDefinition};
use crate::flow::invoker::{FlowInput, FlowOutcome, GraphInvoker};

pub const PROFILE_LOCK: &str = "profile";

pub struct Tracker {
    invoker: GraphInvoker,
    synchronizer: Synchronizer,
    lock_ttl: Duration,
}

impl Tracker {
    pub fn new(
        graph: Arc<CompiledGraph>,
        registry: ActionRegistry,
        synchronizer: Synchronizer,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            invoker: GraphInvoker::new(graph, registry),
            synchronizer,
            lock_ttl,
        }
    }

    /// Compile `definition` and pick the lock store from `config`
    pub fn from_config(
        definition: FlowDefinition,
        registry: ActionRegistry,
        config: &TrackerConfig,
    ) -> Result<Self, TrackerError> {
        let graph = Arc::new(CompiledGraph::compile(&definition)?);

        let store: Arc<dyn KeyValueStore> = match &config.redis_url {
            Some(url) => {
                log::info!("Using redis lock store");
                Arc::new(RedisStore::new(url)?)
            }
            None => {
                log::info!("Using in-memory lock store");
                Arc::new(InMemoryStore::new())
            }
        };
        let synchronizer = Synchronizer::new(store, &config.namespace, config.lock_poll);

        Ok(Self::new(graph, registry, synchronizer, config.lock_ttl))
    }

    pub fn graph(&self) -> &CompiledGraph {
        self.invoker.graph()
    }

    /// Close the node runners; a later `track` constructs them again
    pub async fn close(&self) {
        self.invoker.close().await;
    }

    /// Run the flow for one event under the profile lock.
    ///
    /// Profiles without an `id` are anonymous and run unlocked. Node
    /// failures are reported in the outcome; only lock store failures
    /// surface as `Err`.
    pub async fn track(&self, input: FlowInput) -> Result<FlowOutcome, TrackerError> {
        let profile_id = profile_id(&read(&input.profile));

        let guard = match &profile_id {
            Some(id) => Some(
                self.synchronizer
                    .guard(PROFILE_LOCK, id, self.lock_ttl)
                    .await?,
            ),
            None => {
                log::debug!("Profile has no id, running without a lock");
                None
            }
        };

        let outcome = self.invoker.invoke(input).await;

        if let Some(guard) = guard {
            guard.release().await?;
        }

        if !outcome.is_success() {
            log::warn!(
                "Flow '{}' stopped for event {} with {} error(s)",
                outcome.flow_id,
                outcome.event_id,
                outcome.errors.len()
            );
        }
        Ok(outcome)
    }
}

fn profile_id(profile: &Value) -> Option<String> {
    match profile.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
