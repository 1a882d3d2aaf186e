//! Cache key derivation for dividend lookups.

use crate::dividend::DividendQuery;

/// Prefix shared by every dividend cache key; bulk purge deletes under it.
pub const CACHE_KEY_PREFIX: &str = "tao_dividend:";

const WILDCARD: &str = "all";

/// Deterministic cache key for a (netuid, hotkey) filter pair.
///
/// Absent filters become the `all` segment, so an unfiltered lookup never
/// collides with a filtered one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_query(query: &DividendQuery) -> Self {
        let netuid = query
            .netuid
            .map(|n| n.to_string())
            .unwrap_or_else(|| WILDCARD.to_string());
        let hotkey = query
            .hotkey
            .as_ref()
            .map(|h| h.as_str().to_string())
            .unwrap_or_else(|| WILDCARD.to_string());
        Self(format!("{CACHE_KEY_PREFIX}netuid:{netuid}:hotkey:{hotkey}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
