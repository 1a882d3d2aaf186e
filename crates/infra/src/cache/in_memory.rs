//! In-memory cache store with TTL expiry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{CacheError, CacheStore};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// In-memory cache store for tests/dev.
///
/// Expired entries are invisible to reads and dropped lazily.
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Clock,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Use a custom time source (tests drive expiry through this).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = (self.clock)();
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCacheStore")
            .field("entries", &self.entries.read().map(|e| e.len()).unwrap_or(0))
            .finish()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = (self.clock)();
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so the map does not grow unbounded.
        let mut entries = self.entries.write().unwrap();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Command(format!("invalid ttl: {e}")))?;
        let expires_at = (self.clock)() + ttl;
        self.entries.write().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = (self.clock)();
        let removed = self.entries.write().unwrap().remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let now = (self.clock)();
        let mut entries = self.entries.write().unwrap();
        let mut removed = 0;
        entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                if entry.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn manual_clock(start: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, Clock) {
        let now = Arc::new(Mutex::new(start));
        let handle = now.clone();
        (now, Arc::new(move || *handle.lock().unwrap()))
    }

    #[test]
    fn entry_is_live_until_ttl_then_absent() {
        let start = Utc::now();
        let (now, clock) = manual_clock(start);
        let store = InMemoryCacheStore::with_clock(clock);

        store.set("k", "v", Duration::from_secs(120)).unwrap();

        *now.lock().unwrap() = start + chrono::Duration::seconds(119);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        *now.lock().unwrap() = start + chrono::Duration::seconds(120);
        assert_eq!(store.get("k").unwrap(), None);

        *now.lock().unwrap() = start + chrono::Duration::seconds(500);
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn refresh_overwrites_value_and_expiry() {
        let start = Utc::now();
        let (now, clock) = manual_clock(start);
        let store = InMemoryCacheStore::with_clock(clock);

        store.set("k", "old", Duration::from_secs(10)).unwrap();
        *now.lock().unwrap() = start + chrono::Duration::seconds(5);
        store.set("k", "new", Duration::from_secs(10)).unwrap();

        *now.lock().unwrap() = start + chrono::Duration::seconds(12);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn delete_prefix_only_touches_matching_keys() {
        let store = InMemoryCacheStore::new();
        store.set("tao_dividend:a", "1", Duration::from_secs(60)).unwrap();
        store.set("tao_dividend:b", "2", Duration::from_secs(60)).unwrap();
        store.set("other:c", "3", Duration::from_secs(60)).unwrap();

        assert_eq!(store.delete_prefix("tao_dividend:").unwrap(), 2);
        assert_eq!(store.get("tao_dividend:a").unwrap(), None);
        assert_eq!(store.get("other:c").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn delete_reports_whether_a_live_entry_existed() {
        let store = InMemoryCacheStore::new();
        store.set("k", "v", Duration::from_secs(60)).unwrap();

        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }
}
