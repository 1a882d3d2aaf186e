//! Background pipeline stages: sentiment analysis, then a stake decision.
//!
//! ## Components
//!
//! - `SentimentAnalyzer` / `StakeClient` / `PipelineStore`: external collaborators
//! - `register_pipeline`: installs both stage handlers on an `InMemoryJobQueue`
//! - `pipeline_chain`: the two-stage `ChainSpec` for one target

pub mod sentiment;
pub mod stake;
pub mod store;

use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use taodiv_core::{Hotkey, NetUid, ResolvedTarget};

use crate::jobs::{ChainSpec, InMemoryJobQueue, JobSpecError, StageSpec, TimeLimits};

pub use sentiment::{SentimentAnalyzer, SentimentReport, SimulatedSentimentAnalyzer};
pub use stake::{
    SimulatedStakeClient, StakeClient, StakeDecision, StakeOperation, StakeReceipt,
};
pub use store::{InMemoryPipelineStore, PipelineStore, StoreError};

pub const SENTIMENT_STAGE: &str = "analyze_twitter_sentiment";
pub const STAKE_STAGE: &str = "process_stake_based_on_sentiment";

/// Failure reported by a stage collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// Caller-facing error type carried in stage payloads.
    pub fn error_type(&self) -> &'static str {
        match self {
            StageError::Connection(_) | StageError::Timeout(_) => "service_unavailable",
            StageError::Other(_) => "internal_server_error",
        }
    }
}

/// Collaborators shared by both stages.
#[derive(Clone)]
pub struct PipelineDeps {
    pub analyzer: Arc<dyn SentimentAnalyzer>,
    pub stake_client: Arc<dyn StakeClient>,
    pub store: Arc<dyn PipelineStore>,
}

impl PipelineDeps {
    pub fn simulated() -> Self {
        Self {
            analyzer: Arc::new(SimulatedSentimentAnalyzer::default()),
            stake_client: Arc::new(SimulatedStakeClient::default()),
            store: Arc::new(InMemoryPipelineStore::new()),
        }
    }
}

/// Install the sentiment and stake handlers.
pub fn register_pipeline(queue: &InMemoryJobQueue, deps: PipelineDeps) {
    let sentiment_deps = deps.clone();
    queue.register_handler(SENTIMENT_STAGE, move |ctx| {
        let deps = sentiment_deps.clone();
        async move { sentiment::run(&deps, ctx).await }
    });

    queue.register_handler(STAKE_STAGE, move |ctx| {
        let deps = deps.clone();
        async move { stake::run(&deps, ctx).await }
    });
}

/// Sentiment then stake for `target`.
pub fn pipeline_chain(
    target: &ResolvedTarget,
    sentiment_limits: TimeLimits,
    stake_limits: TimeLimits,
) -> Result<ChainSpec, JobSpecError> {
    let args = vec![json!(target.netuid.get()), json!(target.hotkey.as_str())];
    ChainSpec::new(vec![
        StageSpec::new(SENTIMENT_STAGE, args.clone(), sentiment_limits)?,
        StageSpec::new(STAKE_STAGE, args, stake_limits)?,
    ])
}

/// Read `[netuid, hotkey]` starting at `offset`.
pub(crate) fn target_from_args(args: &[JsonValue], offset: usize) -> Result<ResolvedTarget, String> {
    let netuid = args
        .get(offset)
        .and_then(JsonValue::as_u64)
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| format!("argument {offset} must be a subnet id"))?;
    let hotkey = args
        .get(offset + 1)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| format!("argument {} must be a hotkey", offset + 1))?;
    let hotkey = Hotkey::parse(hotkey).map_err(|e| e.to_string())?;

    Ok(ResolvedTarget {
        netuid: NetUid::new(netuid),
        hotkey,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobQueue;
    use crate::stages::store::STORE_FAILURE_MESSAGE;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingAnalyzer;

    #[async_trait]
    impl SentimentAnalyzer for FailingAnalyzer {
        async fn analyze(&self, _netuid: NetUid) -> Result<SentimentReport, StageError> {
            Err(StageError::Connection("search api unreachable".into()))
        }
    }

    struct FailingStakeClient;

    #[async_trait]
    impl StakeClient for FailingStakeClient {
        async fn add_stake(
            &self,
            _netuid: NetUid,
            _hotkey: &Hotkey,
            _amount: f64,
        ) -> Result<StakeReceipt, StageError> {
            Err(StageError::Connection("node ws://10.0.0.7:9944 refused".into()))
        }

        async fn unstake(
            &self,
            _netuid: NetUid,
            _hotkey: &Hotkey,
            _amount: f64,
        ) -> Result<StakeReceipt, StageError> {
            Err(StageError::Other("wallet locked at /home/ops/.bittensor".into()))
        }
    }

    struct FailingStore;

    impl PipelineStore for FailingStore {
        fn store_sentiment(
            &self,
            _netuid: NetUid,
            _sentiment_score: f64,
            _tweet_count: usize,
        ) -> Result<String, StoreError> {
            Err(StoreError("mongodb://admin:pw@db:27017 unreachable".into()))
        }

        fn record_stake_action(
            &self,
            _netuid: NetUid,
            _hotkey: &Hotkey,
            _operation: StakeOperation,
            _amount: f64,
            _sentiment_score: f64,
        ) -> Result<String, StoreError> {
            Err(StoreError("mongodb://admin:pw@db:27017 unreachable".into()))
        }
    }

    fn target() -> ResolvedTarget {
        ResolvedTarget {
            netuid: NetUid::new(18),
            hotkey: Hotkey::parse("5FFApaS75bv5pJHfAp2FVLBj9ZaXuFDjEypsaBNc1wCfe52v").unwrap(),
        }
    }

    fn limits(soft: u64, hard: u64) -> TimeLimits {
        TimeLimits::new(Duration::from_secs(soft), Duration::from_secs(hard)).unwrap()
    }

    async fn run_pipeline(deps: PipelineDeps) -> JsonValue {
        let queue = InMemoryJobQueue::new();
        register_pipeline(&queue, deps);
        let chain = pipeline_chain(&target(), limits(12, 15), limits(16, 20)).unwrap();
        let handles = queue.submit_chain(&chain).await.unwrap();
        queue
            .wait_result(handles[1].id, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn chain_has_sentiment_then_stake() {
        let chain = pipeline_chain(&target(), limits(12, 15), limits(16, 20)).unwrap();
        let names: Vec<_> = chain.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec![SENTIMENT_STAGE, STAKE_STAGE]);
        assert_eq!(chain.stages()[0].args()[0], json!(18));
    }

    #[tokio::test]
    async fn positive_sentiment_adds_stake_and_records_it() {
        let store = Arc::new(InMemoryPipelineStore::new());
        let deps = PipelineDeps {
            analyzer: Arc::new(SimulatedSentimentAnalyzer::new(40.0)),
            stake_client: Arc::new(SimulatedStakeClient::default()),
            store: store.clone(),
        };

        let result = run_pipeline(deps).await;

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["operation"], json!("add_stake"));
        assert_eq!(result["stored_in_db"], json!(true));
        assert_eq!(store.sentiments().len(), 1);
        let actions = store.stake_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].operation, StakeOperation::AddStake);
        assert!((actions[0].amount - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn analyzer_failure_becomes_a_no_op_stake() {
        let store = Arc::new(InMemoryPipelineStore::new());
        let deps = PipelineDeps {
            analyzer: Arc::new(FailingAnalyzer),
            stake_client: Arc::new(SimulatedStakeClient::default()),
            store: store.clone(),
        };

        let result = run_pipeline(deps).await;

        assert_eq!(result["success"], json!(false));
        assert_eq!(result["operation"], json!("none"));
        assert_eq!(
            result["sentiment_result"]["error_type"],
            json!("service_unavailable")
        );
        assert!(store.stake_actions().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_score_is_clamped() {
        let deps = PipelineDeps {
            analyzer: Arc::new(SimulatedSentimentAnalyzer::new(-250.0)),
            ..PipelineDeps::simulated()
        };

        let result = run_pipeline(deps).await;

        assert_eq!(result["operation"], json!("unstake"));
        assert_eq!(result["sentiment_score"], json!(-100.0));
    }

    #[tokio::test]
    async fn stake_client_failure_reports_a_fixed_message() {
        let deps = PipelineDeps {
            stake_client: Arc::new(FailingStakeClient),
            ..PipelineDeps::simulated()
        };

        let result = run_pipeline(deps).await;

        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"], json!("Unable to connect to blockchain service"));
        assert_eq!(result["error_type"], json!("service_unavailable"));
        assert!(!result.to_string().contains("10.0.0.7"));

        let deps = PipelineDeps {
            analyzer: Arc::new(SimulatedSentimentAnalyzer::new(-40.0)),
            stake_client: Arc::new(FailingStakeClient),
            ..PipelineDeps::simulated()
        };

        let result = run_pipeline(deps).await;

        assert_eq!(result["operation"], json!("unstake"));
        assert_eq!(result["error_type"], json!("internal_server_error"));
        assert!(!result.to_string().contains(".bittensor"));
    }

    #[tokio::test]
    async fn store_failure_reports_a_fixed_message() {
        let queue = InMemoryJobQueue::new();
        register_pipeline(
            &queue,
            PipelineDeps {
                store: Arc::new(FailingStore),
                ..PipelineDeps::simulated()
            },
        );
        let chain = pipeline_chain(&target(), limits(12, 15), limits(16, 20)).unwrap();
        let handles = queue.submit_chain(&chain).await.unwrap();

        for handle in &handles {
            let result = queue
                .wait_result(handle.id, Duration::from_secs(5))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(result["success"], json!(true));
            assert_eq!(result["stored_in_db"], json!(false));
            assert_eq!(result["db_error"], json!(STORE_FAILURE_MESSAGE));
            assert!(!result.to_string().contains("mongodb"));
        }
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(target_from_args(&[json!("x"), json!("hk")], 0).is_err());
        assert!(target_from_args(&[json!(70_000), json!("hk")], 0).is_err());
        assert!(target_from_args(&[json!(1)], 0).is_err());
        assert!(target_from_args(&[json!(1), json!("a:b")], 0).is_err());
    }
}
