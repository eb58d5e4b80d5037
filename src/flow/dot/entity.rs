// SPDX-License-Identifier: MIT

//! Shared entity handles
//!
//! Profile, session and event documents are shared by reference through a
//! whole graph walk. Actions mutate them in place through an `Entity`, or
//! swap the whole document through an `EntityCell`.

use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A shared, mutable JSON document
pub type Entity = Arc<RwLock<Value>>;

/// Wrap a value into a new entity
pub fn entity(value: Value) -> Entity {
    Arc::new(RwLock::new(value))
}

/// Read-lock an entity, recovering from a poisoned lock
pub fn read(entity: &Entity) -> RwLockReadGuard<'_, Value> {
    entity.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write-lock an entity, recovering from a poisoned lock
pub fn write(entity: &Entity) -> RwLockWriteGuard<'_, Value> {
    entity.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holder of the "current" entity pointer for one walk.
///
/// Clones share the same slot, so a replacement made by one node is seen
/// by every later node and by the caller.
#[derive(Clone, Debug)]
pub struct EntityCell {
    slot: Arc<Mutex<Entity>>,
}

impl EntityCell {
    pub fn new(value: Value) -> Self {
        Self::from_entity(entity(value))
    }

    pub fn from_entity(entity: Entity) -> Self {
        Self {
            slot: Arc::new(Mutex::new(entity)),
        }
    }

    /// The entity currently in the slot
    pub fn current(&self) -> Entity {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Put a brand new entity in the slot and return it
    pub fn replace(&self, value: Value) -> Entity {
        let fresh = entity(value);
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh.clone();
        fresh
    }

    /// Deep copy of the current document
    pub fn snapshot(&self) -> Value {
        read(&self.current()).clone()
    }

    /// True if the slot still holds `entity`
    pub fn holds(&self, entity: &Entity) -> bool {
        Arc::ptr_eq(&self.current(), entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_is_visible_to_clones() {
        let cell = EntityCell::new(json!({"id": "1"}));
        let other = cell.clone();
        let before = cell.current();

        other.replace(json!({"id": "2"}));

        assert!(!cell.holds(&before));
        assert_eq!(cell.snapshot(), json!({"id": "2"}));
    }

    #[test]
    fn test_in_place_mutation_keeps_identity() {
        let cell = EntityCell::new(json!({"count": 0}));
        let before = cell.current();

        write(&cell.current())["count"] = json!(1);

        assert!(cell.holds(&before));
        assert_eq!(read(&before)["count"], 1);
    }
}
