//! Cache-first dividend gateway.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use taodiv_core::{CACHE_KEY_PREFIX, CacheKey, DividendQuery, DividendRecord, Settings};

use crate::cache::{CacheError, CacheStore};
use crate::source::{DividendSource, SourceError};

/// Dividend data and whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub record: DividendRecord,
    pub cached: bool,
}

/// What a purge removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PurgeScope {
    All { removed: usize },
    Single { key: String, removed: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Upstream(#[from] SourceError),
    #[error("cache purge failed: {0}")]
    Purge(#[source] CacheError),
}

/// Looks dividends up in the cache before asking the source.
#[derive(Clone)]
pub struct DividendGateway {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn DividendSource>,
    settings: Arc<Settings>,
}

impl DividendGateway {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        source: Arc<dyn DividendSource>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            cache,
            source,
            settings,
        }
    }

    /// Cached value if live, otherwise a fresh query stored under the TTL.
    ///
    /// The key is derived from the raw filters; the source sees normalized
    /// identifiers.
    #[instrument(skip(self), fields(key = tracing::field::Empty))]
    pub async fn resolve(&self, query: &DividendQuery) -> Result<Resolved, GatewayError> {
        let key = CacheKey::for_query(query);
        tracing::Span::current().record("key", key.as_str());

        let lookup = key.to_string();
        match self.run_cache(move |cache| cache.get(&lookup)).await {
            Ok(Some(payload)) => match serde_json::from_str::<DividendRecord>(&payload) {
                Ok(record) => {
                    debug!("cache hit");
                    return Ok(Resolved {
                        record,
                        cached: true,
                    });
                }
                Err(e) => warn!(error = %e, "cached payload unreadable; refreshing"),
            },
            Ok(None) => debug!("cache miss"),
            Err(e) => warn!(error = %e, "cache read failed; treating as miss"),
        }

        let record = self.query_source(query).await?;

        match serde_json::to_string(&record) {
            Ok(payload) => {
                let ttl = self.settings.cache_ttl;
                let written = self
                    .run_cache(move |cache| cache.set(key.as_str(), &payload, ttl))
                    .await;
                if let Err(e) = written {
                    warn!(error = %e, "cache write failed; continuing");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize dividend record for caching"),
        }

        Ok(Resolved {
            record,
            cached: false,
        })
    }

    /// Query the source directly; the cache is neither read nor written.
    pub async fn fetch_fresh(&self, query: &DividendQuery) -> Result<DividendRecord, GatewayError> {
        self.query_source(query).await
    }

    /// Delete the matching key, or every domain key when both filters are absent.
    pub async fn purge(&self, query: &DividendQuery) -> Result<PurgeScope, GatewayError> {
        if query.is_unfiltered() {
            let removed = self
                .run_cache(|cache| cache.delete_prefix(CACHE_KEY_PREFIX))
                .await
                .map_err(GatewayError::Purge)?;
            info!(removed, "purged all dividend cache entries");
            return Ok(PurgeScope::All { removed });
        }

        let key = CacheKey::for_query(query);
        let target = key.to_string();
        let removed = self
            .run_cache(move |cache| cache.delete(&target))
            .await
            .map_err(GatewayError::Purge)?;
        info!(key = %key, removed, "purged dividend cache entry");
        Ok(PurgeScope::Single {
            key: key.to_string(),
            removed,
        })
    }

    /// Run a store call on the blocking pool (stores may do network I/O).
    async fn run_cache<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(&dyn CacheStore) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || op(cache.as_ref()))
            .await
            .map_err(|e| CacheError::Connection(format!("cache task failed: {e}")))?
    }

    async fn query_source(&self, query: &DividendQuery) -> Result<DividendRecord, GatewayError> {
        let target = query.resolve(&self.settings);
        self.source.query(&target).await.map_err(|e| {
            warn!(netuid = %target.netuid, hotkey = %target.hotkey, error = %e, "dividend query failed");
            GatewayError::Upstream(e)
        })
    }
}
