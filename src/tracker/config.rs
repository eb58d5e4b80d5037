// SPDX-License-Identifier: MIT

//! Tracker settings, read from the environment

use std::env;
use std::time::Duration;

use super::error::TrackerError;

pub const DEFAULT_NAMESPACE: &str = "eventflow";
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_LOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Lock store; the in-process store is used when unset
    pub redis_url: Option<String>,
    /// Upper bound on how long a crashed walk can hold a profile lock
    pub lock_ttl: Duration,
    pub lock_poll: Duration,
    /// Prefix of every lock key
    pub namespace: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_poll: DEFAULT_LOCK_POLL,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Read `EVENTFLOW_*` variables, falling back to defaults
    pub fn from_env() -> Result<Self, TrackerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, TrackerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("EVENTFLOW_REDIS_URL").filter(|s| !s.trim().is_empty()) {
            config.redis_url = Some(url);
        }
        if let Some(secs) = lookup("EVENTFLOW_LOCK_TTL_SECS") {
            config.lock_ttl = Duration::from_secs(parse_number("EVENTFLOW_LOCK_TTL_SECS", &secs)?);
        }
        if let Some(ms) = lookup("EVENTFLOW_LOCK_POLL_MS") {
            config.lock_poll = Duration::from_millis(parse_number("EVENTFLOW_LOCK_POLL_MS", &ms)?);
        }
        if let Some(namespace) = lookup("EVENTFLOW_NAMESPACE").filter(|s| !s.trim().is_empty()) {
            config.namespace = namespace;
        }

        if config.lock_ttl.is_zero() {
            return Err(TrackerError::Config(
                "EVENTFLOW_LOCK_TTL_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn with_redis_url(mut self, url: &str) -> Self {
        self.redis_url = Some(url.to_string());
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_lock_poll(mut self, poll: Duration) -> Self {
        self.lock_poll = poll;
        self
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64, TrackerError> {
    raw.trim()
        .parse()
        .map_err(|_| TrackerError::Config(format!("{} is not a number: '{}'", name, raw)))
}
