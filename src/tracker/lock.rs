// SPDX-License-Identifier: MIT

//! Per-identity advisory lock
//!
//! Serializes walks touching the same profile across concurrent deliveries
//! and processes. The lock is a TTL-bounded marker in a key-value store:
//! a normal release deletes it, a crashed holder is outlived by the TTL.
//! Each claim stores its own token and only that token can delete the
//! marker, so a holder that outlived its TTL never frees a successor's claim.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LockError {
    #[error("Lock store error: {0}")]
    Store(String),

    #[error("Invalid lock TTL: {0:?}")]
    InvalidTtl(Duration),
}

/// The narrow store interface the lock needs
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set `key`, overwriting any previous value
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LockError>;

    /// Set `key` only if it does not exist; true if this call set it
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, LockError>;

    async fn exists(&self, key: &str) -> Result<bool, LockError>;

    /// Delete `key` only if it holds `value`; true if this call deleted it
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError>;
}

/// Process-local store, for tests and single-instance deployments
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LockError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if matches!(entries.get(key), Some((_, expires_at)) if *expires_at > now) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().await;
        let held = matches!(
            entries.get(key),
            Some((current, expires_at)) if current == value && *expires_at > Instant::now()
        );
        if held {
            entries.remove(key);
        }
        Ok(held)
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Lock operations over a [`KeyValueStore`]
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    poll_interval: Duration,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str, poll_interval: Duration) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            poll_interval,
        }
    }

    /// Lock key for an identity, e.g. `eventflow:lock:profile:42`
    pub fn key_for(&self, kind: &str, id: &str) -> String {
        format!("{}:lock:{}:{}", self.namespace, kind, id)
    }

    /// Set the marker unconditionally; returns the claim token
    pub async fn lock(&self, key: &str, ttl: Duration) -> Result<String, LockError> {
        check_ttl(ttl)?;
        let token = new_token();
        self.store.set_with_ttl(key, &token, ttl).await?;
        Ok(token)
    }

    pub async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        self.store.exists(key).await
    }

    /// Wait until `key` is free, then claim it for `ttl`. Returns the
    /// claim token needed to `unlock`.
    ///
    /// Polls at a fixed interval. The marker clears on a normal `unlock` or
    /// when the holder's TTL lapses; the claim itself is atomic, so two
    /// waiters never both proceed.
    pub async fn wait_for_unlock(&self, key: &str, ttl: Duration) -> Result<String, LockError> {
        check_ttl(ttl)?;
        let token = new_token();
        let started = Instant::now();
        let mut polls = 0u64;
        while !self.store.set_if_absent(key, &token, ttl).await? {
            if polls == 0 {
                log::debug!("Waiting for lock {}", key);
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;
        }
        if polls > 0 {
            log::debug!(
                "Acquired lock {} after {:?} ({} polls)",
                key,
                started.elapsed(),
                polls
            );
        }
        Ok(token)
    }

    /// Release the claim made with `token`. Returns false when the claim
    /// had already lapsed, in which case the marker is left alone.
    pub async fn unlock(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let released = self.store.delete_if_equals(key, token).await?;
        if !released {
            log::warn!("Lock {} expired before it was released", key);
        }
        Ok(released)
    }

    /// Wait for and claim the lock of one identity
    pub async fn guard(&self, kind: &str, id: &str, ttl: Duration) -> Result<LockGuard, LockError> {
        let key = self.key_for(kind, id);
        let token = self.wait_for_unlock(&key, ttl).await?;
        Ok(LockGuard {
            key,
            token,
            synchronizer: self.clone(),
        })
    }
}

fn check_ttl(ttl: Duration) -> Result<(), LockError> {
    if ttl.is_zero() {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(())
}

/// A claimed lock. Release it explicitly; if dropped, the TTL frees it.
#[must_use = "a lock guard must be released"]
pub struct LockGuard {
    key: String,
    token: String,
    synchronizer: Synchronizer,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns false when the claim had already lapsed
    pub async fn release(self) -> Result<bool, LockError> {
        self.synchronizer.unlock(&self.key, &self.token).await
    }
}
