// SPDX-License-Identifier: MIT

//! Redis-backed lock store
//!
//! Claims are `SET NX PX`; releases run a compare-and-delete script so
//! only the claim's own token removes the key.

use async_trait::async_trait;
use redis::{Client, Script};
use std::time::Duration;

use super::lock::{KeyValueStore, LockError};

/// GET and DEL as one atomic step
const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Clone, Debug)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn new(url: &str) -> Result<Self, LockError> {
        let client = Client::open(url).map_err(store_error)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, LockError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error)
    }
}

fn store_error(err: redis::RedisError) -> LockError {
    LockError::Store(err.to_string())
}

fn ttl_millis(ttl: Duration) -> Result<u64, LockError> {
    match u64::try_from(ttl.as_millis()) {
        Ok(0) | Err(_) => Err(LockError::InvalidTtl(ttl)),
        Ok(ms) => Ok(ms),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LockError> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.connection().await?;
        let _: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.connection().await?;
        let inserted: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(inserted.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, LockError> {
        let mut conn = self.connection().await?;
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(count > 0)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = Script::new(DELETE_IF_EQUALS)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(deleted > 0)
    }
}
