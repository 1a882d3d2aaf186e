//! Stake stage: turns a sentiment score into an add-stake or unstake call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use taodiv_core::{Hotkey, NetUid};

use super::store::STORE_FAILURE_MESSAGE;
use super::{PipelineDeps, StageError, target_from_args};
use crate::jobs::StageContext;

/// TAO staked per sentiment point.
pub const STAKE_PER_SENTIMENT_POINT: f64 = 0.01;

/// Amounts at or below this are skipped as dust.
pub const MIN_STAKE_AMOUNT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeOperation {
    AddStake,
    Unstake,
}

impl StakeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakeOperation::AddStake => "add_stake",
            StakeOperation::Unstake => "unstake",
        }
    }
}

impl std::fmt::Display for StakeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do for a given sentiment score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StakeDecision {
    Skip,
    Execute { operation: StakeOperation, amount: f64 },
}

impl StakeDecision {
    pub fn from_score(score: f64) -> Self {
        let amount = score.abs() * STAKE_PER_SENTIMENT_POINT;
        // NaN compares false and lands here too.
        if !(amount > MIN_STAKE_AMOUNT) {
            return StakeDecision::Skip;
        }
        let operation = if score > 0.0 {
            StakeOperation::AddStake
        } else {
            StakeOperation::Unstake
        };
        StakeDecision::Execute { operation, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeReceipt {
    pub hash: String,
}

#[async_trait]
pub trait StakeClient: Send + Sync {
    async fn add_stake(
        &self,
        netuid: NetUid,
        hotkey: &Hotkey,
        amount: f64,
    ) -> Result<StakeReceipt, StageError>;

    async fn unstake(
        &self,
        netuid: NetUid,
        hotkey: &Hotkey,
        amount: f64,
    ) -> Result<StakeReceipt, StageError>;
}

/// Stand-in for the chain wallet: returns a random transaction hash.
#[derive(Debug, Clone, Default)]
pub struct SimulatedStakeClient {
    delay: Duration,
}

impl SimulatedStakeClient {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn submit(&self) -> Result<StakeReceipt, StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(StakeReceipt {
            hash: format!("0x{}", Uuid::now_v7().simple()),
        })
    }
}

#[async_trait]
impl StakeClient for SimulatedStakeClient {
    async fn add_stake(
        &self,
        _netuid: NetUid,
        _hotkey: &Hotkey,
        _amount: f64,
    ) -> Result<StakeReceipt, StageError> {
        self.submit().await
    }

    async fn unstake(
        &self,
        _netuid: NetUid,
        _hotkey: &Hotkey,
        _amount: f64,
    ) -> Result<StakeReceipt, StageError> {
        self.submit().await
    }
}

/// Stage body. Args: `[sentiment_result, netuid, hotkey]`.
pub(crate) async fn run(deps: &PipelineDeps, ctx: StageContext) -> Result<JsonValue, String> {
    let sentiment = ctx
        .arg(0)
        .cloned()
        .ok_or_else(|| "missing sentiment result argument".to_string())?;
    let target = target_from_args(&ctx.args, 1)?;

    if !sentiment
        .get("success")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
    {
        let reason = sentiment
            .get("error")
            .and_then(JsonValue::as_str)
            .unwrap_or("Unknown error");
        warn!(job_id = %ctx.job_id, reason, "skipping stake; sentiment analysis failed");
        return Ok(json!({
            "success": false,
            "operation": "none",
            "error": format!("Sentiment analysis failed: {reason}"),
            "netuid": target.netuid,
            "hotkey": target.hotkey,
            "sentiment_result": sentiment,
        }));
    }

    let score = sentiment
        .get("sentiment_score")
        .and_then(JsonValue::as_f64)
        .unwrap_or(0.0);

    let (operation, amount) = match StakeDecision::from_score(score) {
        StakeDecision::Skip => {
            info!(job_id = %ctx.job_id, score, "stake amount negligible; nothing to do");
            return Ok(json!({
                "success": true,
                "operation": "none",
                "message": "Sentiment score resulted in zero or negligible stake amount",
                "netuid": target.netuid,
                "hotkey": target.hotkey,
                "sentiment_score": score,
                "amount": 0,
            }));
        }
        StakeDecision::Execute { operation, amount } => (operation, amount),
    };

    info!(job_id = %ctx.job_id, %operation, amount, score, "submitting stake operation");
    let call = async {
        match operation {
            StakeOperation::AddStake => {
                deps.stake_client
                    .add_stake(target.netuid, &target.hotkey, amount)
                    .await
            }
            StakeOperation::Unstake => {
                deps.stake_client
                    .unstake(target.netuid, &target.hotkey, amount)
                    .await
            }
        }
    };

    let receipt = match tokio::time::timeout(ctx.soft_remaining(), call).await {
        Err(_) => {
            warn!(job_id = %ctx.job_id, %operation, "stake operation hit its soft time limit");
            return Ok(json!({
                "success": false,
                "operation": operation,
                "netuid": target.netuid,
                "hotkey": target.hotkey,
                "amount": amount,
                "sentiment_score": score,
                "hash": null,
                "error": "Task timed out during blockchain operation",
                "timed_out": true,
            }));
        }
        Ok(Err(err)) => {
            error!(job_id = %ctx.job_id, %operation, error = %err, "stake operation failed");
            let message = match &err {
                StageError::Connection(_) | StageError::Timeout(_) => {
                    "Unable to connect to blockchain service"
                }
                StageError::Other(_) => "An unexpected error occurred during the stake operation",
            };
            return Ok(json!({
                "success": false,
                "operation": operation,
                "netuid": target.netuid,
                "hotkey": target.hotkey,
                "amount": amount,
                "sentiment_score": score,
                "error": message,
                "error_type": err.error_type(),
                "stored_in_db": false,
            }));
        }
        Ok(Ok(receipt)) => receipt,
    };

    let mut result = json!({
        "success": true,
        "operation": operation,
        "netuid": target.netuid,
        "hotkey": target.hotkey,
        "amount": amount,
        "sentiment_score": score,
        "hash": receipt.hash,
    });
    match deps
        .store
        .record_stake_action(target.netuid, &target.hotkey, operation, amount, score)
    {
        Ok(id) => {
            result["stored_in_db"] = json!(true);
            result["db_record_id"] = json!(id);
        }
        Err(err) => {
            error!(job_id = %ctx.job_id, error = %err, "failed to record stake action");
            result["stored_in_db"] = json!(false);
            result["db_error"] = json!(STORE_FAILURE_MESSAGE);
        }
    }

    info!(job_id = %ctx.job_id, %operation, "stake operation completed");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_score_stakes_one_percent() {
        match StakeDecision::from_score(50.0) {
            StakeDecision::Execute { operation, amount } => {
                assert_eq!(operation, StakeOperation::AddStake);
                assert!((amount - 0.5).abs() < 1e-9);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn negative_score_unstakes() {
        match StakeDecision::from_score(-20.0) {
            StakeDecision::Execute { operation, amount } => {
                assert_eq!(operation, StakeOperation::Unstake);
                assert!((amount - 0.2).abs() < 1e-9);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn dust_and_nan_are_skipped() {
        assert_eq!(StakeDecision::from_score(0.0), StakeDecision::Skip);
        assert_eq!(StakeDecision::from_score(0.05), StakeDecision::Skip);
        assert_eq!(StakeDecision::from_score(-0.05), StakeDecision::Skip);
        assert_eq!(StakeDecision::from_score(f64::NAN), StakeDecision::Skip);
    }

    #[test]
    fn operation_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StakeOperation::AddStake).unwrap(),
            "\"add_stake\""
        );
    }
}
