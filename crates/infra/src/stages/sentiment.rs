//! Sentiment stage: scores recent social chatter about a subnet.
//!
//! Collaborator failures never fail the job; they come back as an error
//! payload (`success: false`) that the stake stage turns into a no-op.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info, warn};

use taodiv_core::{NetUid, ResolvedTarget};

use super::store::STORE_FAILURE_MESSAGE;
use super::{PipelineDeps, StageError, target_from_args};
use crate::jobs::StageContext;

/// Scores are clamped to this range.
pub const MAX_SENTIMENT_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentReport {
    /// -100 (very negative) to +100 (very positive)
    pub score: f64,
    pub tweet_count: usize,
}

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, netuid: NetUid) -> Result<SentimentReport, StageError>;
}

/// Fixed-score analyzer standing in for the search and LLM services.
#[derive(Debug, Clone)]
pub struct SimulatedSentimentAnalyzer {
    score: f64,
    tweet_count: usize,
    delay: Duration,
}

impl SimulatedSentimentAnalyzer {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            tweet_count: 20,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for SimulatedSentimentAnalyzer {
    fn default() -> Self {
        Self::new(25.0)
    }
}

#[async_trait]
impl SentimentAnalyzer for SimulatedSentimentAnalyzer {
    async fn analyze(&self, _netuid: NetUid) -> Result<SentimentReport, StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(SentimentReport {
            score: self.score,
            tweet_count: self.tweet_count,
        })
    }
}

fn error_payload(target: &ResolvedTarget, error_type: &str, message: &str) -> JsonValue {
    json!({
        "success": false,
        "netuid": target.netuid,
        "hotkey": target.hotkey,
        "error_type": error_type,
        "error": message,
    })
}

/// Stage body. Args: `[netuid, hotkey]`.
pub(crate) async fn run(deps: &PipelineDeps, ctx: StageContext) -> Result<JsonValue, String> {
    let target = target_from_args(&ctx.args, 0)?;
    info!(job_id = %ctx.job_id, netuid = %target.netuid, hotkey = %target.hotkey, "sentiment analysis started");

    let report = match tokio::time::timeout(
        ctx.soft_remaining(),
        deps.analyzer.analyze(target.netuid),
    )
    .await
    {
        Err(_) => {
            warn!(job_id = %ctx.job_id, netuid = %target.netuid, "sentiment analysis hit its soft time limit");
            return Ok(error_payload(
                &target,
                "request_timeout",
                "Sentiment analysis timed out",
            ));
        }
        Ok(Err(err)) => {
            error!(job_id = %ctx.job_id, netuid = %target.netuid, error = %err, "sentiment analysis failed");
            let message = match &err {
                StageError::Connection(_) | StageError::Timeout(_) => {
                    "Unable to connect to external data service"
                }
                StageError::Other(_) => "An unexpected error occurred during sentiment analysis",
            };
            return Ok(error_payload(&target, err.error_type(), message));
        }
        Ok(Ok(report)) => report,
    };

    let score = report
        .score
        .clamp(-MAX_SENTIMENT_SCORE, MAX_SENTIMENT_SCORE);

    let mut result = json!({
        "success": true,
        "netuid": target.netuid,
        "hotkey": target.hotkey,
        "sentiment_score": score,
        "tweet_count": report.tweet_count,
    });
    match deps
        .store
        .store_sentiment(target.netuid, score, report.tweet_count)
    {
        Ok(id) => {
            result["stored_in_db"] = json!(true);
            result["db_record_id"] = json!(id);
        }
        Err(err) => {
            error!(job_id = %ctx.job_id, error = %err, "failed to store sentiment result");
            result["stored_in_db"] = json!(false);
            result["db_error"] = json!(STORE_FAILURE_MESSAGE);
        }
    }

    info!(job_id = %ctx.job_id, netuid = %target.netuid, score, "sentiment analysis finished");
    Ok(result)
}
