// SPDX-License-Identifier: MIT

//! Tracker layer
//!
//! This module provides:
//! - `Synchronizer` - per-identity lock over a TTL key-value store
//! - `RedisStore` / `InMemoryStore` - lock stores
//! - `TrackerConfig` - environment configuration
//! - `FlowLoader` - YAML/JSON flow definitions
//! - `actions` - built-in actions
//! - `Tracker` - runs a flow per event under the profile lock

pub mod actions;
pub mod config;
pub mod error;
pub mod loader;
pub mod lock;
pub mod redis_store;
pub mod service;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use loader::FlowLoader;
pub use lock::{InMemoryStore, KeyValueStore, LockError, LockGuard, Synchronizer};
pub use redis_store::RedisStore;
pub use service::Tracker;
