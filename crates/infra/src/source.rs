//! Dividend source: the chain query collaborator.

use std::time::Duration;

use async_trait::async_trait;

use taodiv_core::{DividendRecord, ResolvedTarget};

/// Dividend value returned by the simulated source.
pub const SIMULATED_DIVIDEND: u64 = 12_345_678;

/// Queries dividend data for a concrete subnet/account pair.
///
/// Latency is unbounded from the caller's perspective; no timeout is imposed here.
#[async_trait]
pub trait DividendSource: Send + Sync {
    async fn query(&self, target: &ResolvedTarget) -> Result<DividendRecord, SourceError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("dividend source unavailable: {0}")]
    Unavailable(String),
    #[error("dividend source returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Stand-in for the chain RPC: fixed dividend after an artificial delay.
#[derive(Debug, Clone)]
pub struct SimulatedDividendSource {
    delay: Duration,
    dividend: u64,
}

impl SimulatedDividendSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            dividend: SIMULATED_DIVIDEND,
        }
    }

    pub fn with_dividend(mut self, dividend: u64) -> Self {
        self.dividend = dividend;
        self
    }
}

impl Default for SimulatedDividendSource {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl DividendSource for SimulatedDividendSource {
    async fn query(&self, target: &ResolvedTarget) -> Result<DividendRecord, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(DividendRecord {
            netuid: target.netuid,
            hotkey: target.hotkey.clone(),
            dividend: self.dividend,
        })
    }
}
