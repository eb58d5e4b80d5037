// SPDX-License-Identifier: MIT

//! Run-once gate
//!
//! Suppresses repeated invocations of a node for the same profile within a
//! time window. Windows live in memory, shared by every walk of the invoker
//! that owns the gate. Expired windows are pruned at most once per prune
//! interval.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::flow::condition::Condition;
use crate::flow::dot::{DotAccessor, Resolved};
use crate::flow::error::ActionError;
use crate::flow::graph::{RunOnce, RunOnceKind};

struct Window {
    last: Value,
    expires_at: Instant,
}

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

struct Windows {
    entries: HashMap<(String, String), Window>,
    next_prune: Instant,
}

pub struct RunOnceGate {
    windows: Mutex<Windows>,
    prune_interval: Duration,
}

impl Default for RunOnceGate {
    fn default() -> Self {
        Self {
            windows: Mutex::new(Windows {
                entries: HashMap::new(),
                next_prune: Instant::now(),
            }),
            prune_interval: PRUNE_INTERVAL,
        }
    }
}

impl RunOnceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    /// Number of windows held, expired ones included until pruned
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired window
    pub fn prune(&self) {
        let now = Instant::now();
        self.lock().entries.retain(|_, w| w.expires_at > now);
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide whether `node_id` may run now. `false` means the call is
    /// suppressed and must produce no output.
    pub fn admit(
        &self,
        node_id: &str,
        settings: &RunOnce,
        accessor: &DotAccessor,
    ) -> Result<bool, ActionError> {
        let identity = match accessor.get("profile@id") {
            Ok(Resolved::Value(Value::String(id))) => id,
            Ok(Resolved::Value(other)) => other.to_string(),
            _ => String::new(),
        };

        let current = match settings.kind {
            RunOnceKind::Value => match accessor.get(&settings.expression) {
                Ok(resolved) => resolved.into_value(),
                Err(_) => Value::Null,
            },
            RunOnceKind::Condition => {
                if !Condition::parse(&settings.expression)?.evaluate(accessor)? {
                    return Ok(false);
                }
                Value::Bool(true)
            }
        };

        let now = Instant::now();
        let key = (node_id.to_string(), identity);
        let mut windows = self.lock();

        if now >= windows.next_prune {
            let before = windows.entries.len();
            windows.entries.retain(|_, w| w.expires_at > now);
            windows.next_prune = now + self.prune_interval;
            let pruned = before - windows.entries.len();
            if pruned > 0 {
                log::debug!("Pruned {} expired run-once windows", pruned);
            }
        }

        if let Some(window) = windows.entries.get(&key) {
            if now < window.expires_at && window.last == current {
                log::debug!("Run-once suppressed node {} for {:?}", node_id, key.1);
                return Ok(false);
            }
        }

        windows.entries.insert(
            key,
            Window {
                last: current,
                expires_at: now + Duration::from_secs(settings.ttl),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::dot::Namespace;
    use serde_json::json;

    fn accessor(profile: Value, payload: Value) -> DotAccessor {
        DotAccessor::new()
            .bind_value(Namespace::Profile, profile)
            .bind_value(Namespace::Payload, payload)
    }

    fn settings(kind: RunOnceKind, expression: &str, ttl: u64) -> RunOnce {
        RunOnce {
            kind,
            expression: expression.to_string(),
            ttl,
        }
    }

    #[test]
    fn test_value_gate_suppresses_same_value() {
        let gate = RunOnceGate::new();
        let once = settings(RunOnceKind::Value, "payload@plan", 60);
        let dot = accessor(json!({"id": "p1"}), json!({"plan": "pro"}));

        assert!(gate.admit("n1", &once, &dot).unwrap());
        assert!(!gate.admit("n1", &once, &dot).unwrap());

        let changed = accessor(json!({"id": "p1"}), json!({"plan": "free"}));
        assert!(gate.admit("n1", &once, &changed).unwrap());
    }

    #[test]
    fn test_windows_are_per_profile_and_node() {
        let gate = RunOnceGate::new();
        let once = settings(RunOnceKind::Value, "payload@plan", 60);
        let p1 = accessor(json!({"id": "p1"}), json!({"plan": "pro"}));
        let p2 = accessor(json!({"id": "p2"}), json!({"plan": "pro"}));

        assert!(gate.admit("n1", &once, &p1).unwrap());
        assert!(gate.admit("n1", &once, &p2).unwrap());
        assert!(gate.admit("n2", &once, &p1).unwrap());
    }

    #[test]
    fn test_condition_gate_fires_first_true_only() {
        let gate = RunOnceGate::new();
        let once = settings(RunOnceKind::Condition, "payload@score > 5", 60);

        let low = accessor(json!({"id": "p1"}), json!({"score": 1}));
        let high = accessor(json!({"id": "p1"}), json!({"score": 9}));

        assert!(!gate.admit("n1", &once, &low).unwrap());
        assert!(gate.admit("n1", &once, &high).unwrap());
        assert!(!gate.admit("n1", &once, &high).unwrap());
    }

    #[test]
    fn test_expired_window_admits_again() {
        let gate = RunOnceGate::new();
        let once = settings(RunOnceKind::Value, "payload@plan", 0);
        let dot = accessor(json!({"id": "p1"}), json!({"plan": "pro"}));

        assert!(gate.admit("n1", &once, &dot).unwrap());
        assert!(gate.admit("n1", &once, &dot).unwrap());
    }

    #[test]
    fn test_expired_windows_are_pruned() {
        let gate = RunOnceGate::new().with_prune_interval(Duration::ZERO);
        let once = settings(RunOnceKind::Value, "payload@plan", 0);

        for id in ["p1", "p2", "p3"] {
            let dot = accessor(json!({"id": id}), json!({"plan": "pro"}));
            assert!(gate.admit("n1", &once, &dot).unwrap());
        }
        assert_eq!(gate.len(), 1);

        gate.prune();
        assert!(gate.is_empty());
    }

    #[test]
    fn test_live_windows_survive_pruning() {
        let gate = RunOnceGate::new();
        let once = settings(RunOnceKind::Value, "payload@plan", 60);
        let dot = accessor(json!({"id": "p1"}), json!({"plan": "pro"}));

        assert!(gate.admit("n1", &once, &dot).unwrap());
        gate.prune();
        assert_eq!(gate.len(), 1);
        assert!(!gate.admit("n1", &once, &dot).unwrap());
    }

    #[test]
    fn test_bad_condition_is_an_error() {
        let gate = RunOnceGate::new();
        let once = settings(RunOnceKind::Condition, "payload@score >", 60);
        let dot = accessor(json!({"id": "p1"}), json!({}));
        assert!(matches!(
            gate.admit("n1", &once, &dot),
            Err(ActionError::Expression(_))
        ));
    }
}
