//! Redis-backed cache store (`SETEX`/`GET`/`DEL`/`KEYS`).
//!
//! Connections are opened per call; the store holds only the client.

use std::sync::Arc;
use std::time::Duration;

use redis::Commands;
use tracing::{debug, instrument};

use super::{CacheError, CacheStore};

#[derive(Debug, Clone)]
pub struct RedisCacheStore {
    client: Arc<redis::Client>,
}

impl RedisCacheStore {
    /// Create a store for the given Redis URL (e.g. "redis://localhost:6379/0").
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        self.client
            .get_connection()
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

impl CacheStore for RedisCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection()?;
        conn.get(key).map_err(|e| CacheError::Command(e.to_string()))
    }

    #[instrument(skip(self, value), err)]
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        // Redis rejects a zero expiry; round sub-second TTLs up.
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs)
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;
        let removed: usize = conn.del(key).map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), err)]
    fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection()?;
        let keys: Vec<String> = conn
            .keys(format!("{prefix}*"))
            .map_err(|e| CacheError::Command(e.to_string()))?;
        if keys.is_empty() {
            return Ok(0);
        }
        debug!(count = keys.len(), "purging cache keys");
        conn.del(keys)
            .map_err(|e| CacheError::Command(e.to_string()))
    }
}
