//! Dividend query and result types.

use serde::{Deserialize, Serialize};

use crate::id::{Hotkey, NetUid};
use crate::settings::Settings;

/// Filters supplied by a caller. Either side may be absent ("all").
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DividendQuery {
    pub netuid: Option<NetUid>,
    pub hotkey: Option<Hotkey>,
}

impl DividendQuery {
    pub fn new(netuid: Option<NetUid>, hotkey: Option<Hotkey>) -> Self {
        Self { netuid, hotkey }
    }

    /// Query with both filters absent.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unfiltered(&self) -> bool {
        self.netuid.is_none() && self.hotkey.is_none()
    }

    /// Fill missing identifiers from the configured defaults.
    ///
    /// Every component downstream of the request boundary (source queries and
    /// background stages) works on the resolved target, never on raw filters.
    pub fn resolve(&self, settings: &Settings) -> ResolvedTarget {
        ResolvedTarget {
            netuid: self.netuid.unwrap_or(settings.default_netuid),
            hotkey: self
                .hotkey
                .clone()
                .unwrap_or_else(|| settings.default_hotkey.clone()),
        }
    }
}

/// A concrete subnet/account pair with no wildcards left.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub netuid: NetUid,
    pub hotkey: Hotkey,
}

/// Dividend data returned by the chain query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendRecord {
    pub netuid: NetUid,
    pub hotkey: Hotkey,
    pub dividend: u64,
}
