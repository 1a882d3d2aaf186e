//! Key/value cache stores for dividend lookups.
//!
//! ## Design
//!
//! - Values are opaque serialized payloads with a TTL
//! - Entries are overwritten on refresh, never mutated in place
//! - Concurrent writers follow last-write-wins per key
//!
//! ## Components
//!
//! - `CacheStore`: store abstraction used by the gateway
//! - `InMemoryCacheStore`: expiry-checked map for tests/dev
//! - `RedisCacheStore`: Redis-backed store (feature `redis`)

mod in_memory;
#[cfg(feature = "redis")]
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

pub use in_memory::InMemoryCacheStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisCacheStore;

/// Cache store abstraction.
pub trait CacheStore: Send + Sync {
    /// Fetch a live (non-expired) value.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value that expires after `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a single key. Returns whether a live entry was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

/// Cache store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),
    #[error("cache command error: {0}")]
    Command(String),
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        (**self).delete_prefix(prefix)
    }
}
