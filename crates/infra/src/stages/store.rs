//! Persistence for pipeline outcomes (sentiment scores and stake actions).

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use taodiv_core::{Hotkey, NetUid};

use super::stake::StakeOperation;

/// Reported in stage results in place of the store's own error text.
pub const STORE_FAILURE_MESSAGE: &str = "Failed to save the result to the database";

#[derive(Debug, Clone, thiserror::Error)]
#[error("pipeline store error: {0}")]
pub struct StoreError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentRecord {
    pub id: String,
    pub netuid: NetUid,
    pub sentiment_score: f64,
    pub tweet_count: usize,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeActionRecord {
    pub id: String,
    pub netuid: NetUid,
    pub hotkey: Hotkey,
    pub operation: StakeOperation,
    pub amount: f64,
    pub sentiment_score: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only store for pipeline results. Returns the new record's id.
pub trait PipelineStore: Send + Sync {
    fn store_sentiment(
        &self,
        netuid: NetUid,
        sentiment_score: f64,
        tweet_count: usize,
    ) -> Result<String, StoreError>;

    fn record_stake_action(
        &self,
        netuid: NetUid,
        hotkey: &Hotkey,
        operation: StakeOperation,
        amount: f64,
        sentiment_score: f64,
    ) -> Result<String, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    sentiments: RwLock<Vec<SentimentRecord>>,
    stake_actions: RwLock<Vec<StakeActionRecord>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sentiments(&self) -> Vec<SentimentRecord> {
        self.sentiments.read().unwrap().clone()
    }

    pub fn stake_actions(&self) -> Vec<StakeActionRecord> {
        self.stake_actions.read().unwrap().clone()
    }
}

impl PipelineStore for InMemoryPipelineStore {
    fn store_sentiment(
        &self,
        netuid: NetUid,
        sentiment_score: f64,
        tweet_count: usize,
    ) -> Result<String, StoreError> {
        let id = Uuid::now_v7().to_string();
        self.sentiments.write().unwrap().push(SentimentRecord {
            id: id.clone(),
            netuid,
            sentiment_score,
            tweet_count,
            recorded_at: Utc::now(),
        });
        Ok(id)
    }

    fn record_stake_action(
        &self,
        netuid: NetUid,
        hotkey: &Hotkey,
        operation: StakeOperation,
        amount: f64,
        sentiment_score: f64,
    ) -> Result<String, StoreError> {
        let id = Uuid::now_v7().to_string();
        self.stake_actions.write().unwrap().push(StakeActionRecord {
            id: id.clone(),
            netuid,
            hotkey: hotkey.clone(),
            operation,
            amount,
            sentiment_score,
            recorded_at: Utc::now(),
        });
        Ok(id)
    }
}
