//! Chain orchestration: submit, trace lineage, wait, and clean up on failure.
//!
//! ## Flow
//!
//! 1. Open an `OrchestrationScope`
//! 2. Submit the sentiment → stake chain; every created job is tracked
//! 3. Rebuild lineage from the last stage's handle
//! 4. Optionally wait for the last stage under a bounded timeout
//! 5. Close the scope with the outcome (failure revokes every tracked job)
//!
//! A wait that runs out of time is not a failure: the chain keeps running and
//! the caller gets its job ids back.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use taodiv_core::{JobId, ResolvedTarget, Settings};

use crate::errors::{ErrorCategory, OrchestrationError};
use crate::jobs::{
    ChainLineage, ChainSpec, JobHandle, JobQueue, JobSpecError, QueueError, TimeLimits,
};
use crate::lifecycle::{OrchestrationScope, RevocationManager, RevocationMetrics};
use crate::stages::pipeline_chain;

/// Slack added on top of the queue-side wait before the local deadline fires.
pub const LOCAL_WAIT_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub lineage_max_depth: usize,
    pub sentiment_limits: TimeLimits,
    pub stake_limits: TimeLimits,
    pub wait_grace: Duration,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, JobSpecError> {
        Ok(Self {
            lineage_max_depth: settings.lineage_max_depth,
            sentiment_limits: TimeLimits::from_settings(&settings.sentiment_limits)?,
            stake_limits: TimeLimits::from_settings(&settings.stake_limits)?,
            wait_grace: LOCAL_WAIT_GRACE,
        })
    }
}

/// Why a wait ended without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    /// Our own deadline elapsed before the queue answered.
    LocalDeadline,
    /// The queue answered that the job is not finished yet.
    QueueTimeout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Completed(JsonValue),
    Pending(PendingReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOptions {
    pub wait: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ChainProgress {
    /// Submitted; the caller did not wait.
    Submitted,
    /// The last stage finished with this result.
    Completed(JsonValue),
    /// The wait ran out; the chain is still running.
    StillRunning(PendingReason),
}

/// Successful (or still running) chain trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainReport {
    /// Job ids, oldest first.
    pub task_ids: Vec<JobId>,
    pub lineage_truncated: bool,
    pub progress: ChainProgress,
}

/// Classified chain failure, after the revocation pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{category}: {details}")]
pub struct ChainFailure {
    pub category: ErrorCategory,
    pub details: String,
    pub task_ids: Vec<JobId>,
    pub metrics: RevocationMetrics,
}

pub struct ChainOrchestrator {
    queue: Arc<dyn JobQueue>,
    lifecycle: RevocationManager,
    config: OrchestratorConfig,
}

impl ChainOrchestrator {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        lifecycle: RevocationManager,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Submit `chain` and return the last stage's handle.
    ///
    /// Every job the queue created, even on failure, is tracked in `scope`.
    pub async fn submit_chain(
        &self,
        scope: &mut OrchestrationScope,
        chain: &ChainSpec,
    ) -> Result<JobHandle, OrchestrationError> {
        match self.queue.submit_chain(chain).await {
            Ok(handles) => {
                for handle in &handles {
                    scope.track(handle);
                }
                handles.last().cloned().ok_or_else(|| {
                    OrchestrationError::TaskCreation(QueueError::Rejected(
                        "queue accepted the chain but returned no jobs".to_string(),
                    ))
                })
            }
            Err(err) => {
                for handle in &err.created {
                    scope.track(handle);
                }
                Err(OrchestrationError::from_submit(err))
            }
        }
    }

    /// Depth-bounded lineage ending at `last`.
    pub fn lineage(&self, last: &JobHandle) -> ChainLineage {
        ChainLineage::reconstruct(last.id, self.config.lineage_max_depth, |id| {
            self.queue.parent_of(id)
        })
    }

    /// Wait up to `timeout` for the last stage.
    ///
    /// Running out of time yields `WaitOutcome::Pending` and never revokes.
    #[instrument(skip(self, last), fields(job_id = %last.id))]
    pub async fn await_result(
        &self,
        last: &JobHandle,
        timeout: Duration,
    ) -> Result<WaitOutcome, OrchestrationError> {
        let local_deadline = timeout + self.config.wait_grace;
        let waited =
            tokio::time::timeout(local_deadline, self.queue.wait_result(last.id, timeout)).await;

        match waited {
            Err(_) => {
                warn!(?timeout, "local wait deadline elapsed; chain left running");
                Ok(WaitOutcome::Pending(PendingReason::LocalDeadline))
            }
            Ok(Ok(None)) => {
                warn!(?timeout, "queue reported job unfinished within timeout; chain left running");
                Ok(WaitOutcome::Pending(PendingReason::QueueTimeout))
            }
            Ok(Err(QueueError::Timeout(message))) => {
                warn!(?timeout, reason = %message, "queue wait timed out; chain left running");
                Ok(WaitOutcome::Pending(PendingReason::QueueTimeout))
            }
            Ok(Ok(Some(JsonValue::Null))) => Err(OrchestrationError::EmptyResult(last.id)),
            Ok(Ok(Some(value))) => Ok(WaitOutcome::Completed(value)),
            Ok(Err(err)) => Err(OrchestrationError::from_wait(err)),
        }
    }

    /// Run the sentiment → stake pipeline for `target`.
    #[instrument(skip(self), fields(netuid = %target.netuid, hotkey = %target.hotkey))]
    pub async fn trigger(
        &self,
        target: &ResolvedTarget,
        options: TriggerOptions,
    ) -> Result<ChainReport, ChainFailure> {
        let mut scope = self.lifecycle.scope();

        match self.run(&mut scope, target, options).await {
            Ok(report) => {
                scope.close(false).await;
                info!(
                    tasks = report.task_ids.len(),
                    truncated = report.lineage_truncated,
                    "chain triggered"
                );
                Ok(report)
            }
            Err(err) => {
                let task_ids = scope.tracked_ids().to_vec();
                let (category, details, metrics) = scope.fail(&err).await;
                Err(ChainFailure {
                    category,
                    details,
                    task_ids,
                    metrics,
                })
            }
        }
    }

    async fn run(
        &self,
        scope: &mut OrchestrationScope,
        target: &ResolvedTarget,
        options: TriggerOptions,
    ) -> Result<ChainReport, OrchestrationError> {
        let chain = pipeline_chain(
            target,
            self.config.sentiment_limits,
            self.config.stake_limits,
        )?;
        let last = self.submit_chain(scope, &chain).await?;
        let lineage = self.lineage(&last);

        let progress = if options.wait {
            match self.await_result(&last, options.timeout).await? {
                WaitOutcome::Completed(value) => ChainProgress::Completed(value),
                WaitOutcome::Pending(reason) => ChainProgress::StillRunning(reason),
            }
        } else {
            ChainProgress::Submitted
        };

        Ok(ChainReport {
            task_ids: lineage.ids,
            lineage_truncated: lineage.truncated,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobQueue, JobState, SubmitError};
    use crate::lifecycle::RevocationPolicy;
    use crate::stages::{
        PipelineDeps, SENTIMENT_STAGE, STAKE_STAGE, SimulatedSentimentAnalyzer, register_pipeline,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use taodiv_core::{Hotkey, NetUid};

    /// Queue with scripted submit and wait outcomes.
    #[derive(Default)]
    struct ScriptedQueue {
        submit: Mutex<Option<Result<Vec<JobHandle>, SubmitError>>>,
        /// `None` waits forever.
        wait: Mutex<Option<Result<Option<JsonValue>, QueueError>>>,
        parents: Mutex<HashMap<JobId, JobId>>,
        revoked: Mutex<Vec<JobId>>,
    }

    impl ScriptedQueue {
        fn submit_fails(self, err: SubmitError) -> Self {
            *self.submit.lock().unwrap() = Some(Err(err));
            self
        }

        fn wait_returns(self, result: Result<Option<JsonValue>, QueueError>) -> Self {
            *self.wait.lock().unwrap() = Some(result);
            self
        }

        fn revoked(&self) -> Vec<JobId> {
            self.revoked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobQueue for ScriptedQueue {
        async fn submit_chain(&self, chain: &ChainSpec) -> Result<Vec<JobHandle>, SubmitError> {
            if let Some(scripted) = self.submit.lock().unwrap().take() {
                return scripted;
            }
            let mut parent = None;
            let mut handles = Vec::new();
            for stage in chain.stages() {
                let handle = JobHandle {
                    id: JobId::new(),
                    name: stage.name().to_string(),
                    parent,
                    limits: stage.limits(),
                };
                if let Some(p) = parent {
                    self.parents.lock().unwrap().insert(handle.id, p);
                }
                parent = Some(handle.id);
                handles.push(handle);
            }
            Ok(handles)
        }

        async fn wait_result(
            &self,
            _id: JobId,
            _timeout: Duration,
        ) -> Result<Option<JsonValue>, QueueError> {
            let scripted = self.wait.lock().unwrap().take();
            match scripted {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn revoke(&self, id: JobId, _terminate: bool) -> Result<(), QueueError> {
            self.revoked.lock().unwrap().push(id);
            Ok(())
        }

        async fn state(&self, _id: JobId) -> Result<JobState, QueueError> {
            Ok(JobState::Running)
        }

        fn parent_of(&self, id: JobId) -> Option<JobId> {
            self.parents.lock().unwrap().get(&id).copied()
        }
    }

    fn orchestrator(queue: Arc<dyn JobQueue>) -> ChainOrchestrator {
        let config = OrchestratorConfig::from_settings(&Settings::default()).unwrap();
        let lifecycle = RevocationManager::new(queue.clone(), RevocationPolicy::default());
        ChainOrchestrator::new(queue, lifecycle, config)
    }

    fn target() -> ResolvedTarget {
        ResolvedTarget {
            netuid: NetUid::new(18),
            hotkey: Hotkey::parse("5FFApaS75bv5pJHfAp2FVLBj9ZaXuFDjEypsaBNc1wCfe52v").unwrap(),
        }
    }

    fn wait_for(secs: u64) -> TriggerOptions {
        TriggerOptions {
            wait: true,
            timeout: Duration::from_secs(secs),
        }
    }

    fn stub_handle() -> JobHandle {
        JobHandle {
            id: JobId::new(),
            name: "analyze_twitter_sentiment".into(),
            parent: None,
            limits: TimeLimits::new(Duration::from_secs(1), Duration::from_secs(2)).unwrap(),
        }
    }

    #[tokio::test]
    async fn creation_failure_revokes_nothing() {
        let queue = Arc::new(ScriptedQueue::default().submit_fails(SubmitError::nothing_created(
            QueueError::Connection("broker unreachable".into()),
        )));

        let failure = orchestrator(queue.clone())
            .trigger(&target(), wait_for(5))
            .await
            .unwrap_err();

        assert_eq!(failure.category, ErrorCategory::TaskCreation);
        assert_eq!(failure.metrics, RevocationMetrics::default());
        assert!(failure.task_ids.is_empty());
        assert!(queue.revoked().is_empty());
    }

    #[tokio::test]
    async fn chaining_failure_revokes_the_created_jobs() {
        let created = stub_handle();
        let queue = Arc::new(ScriptedQueue::default().submit_fails(SubmitError {
            created: vec![created.clone()],
            source: QueueError::Connection("connection reset".into()),
        }));

        let failure = orchestrator(queue.clone())
            .trigger(&target(), wait_for(5))
            .await
            .unwrap_err();

        assert_eq!(failure.category, ErrorCategory::TaskChaining);
        assert_eq!(failure.task_ids, vec![created.id]);
        assert_eq!(failure.metrics.attempts, 1);
        assert_eq!(queue.revoked(), vec![created.id]);
    }

    #[tokio::test]
    async fn empty_result_is_an_error_and_revokes_the_chain() {
        let queue = Arc::new(ScriptedQueue::default().wait_returns(Ok(Some(JsonValue::Null))));

        let failure = orchestrator(queue.clone())
            .trigger(&target(), wait_for(5))
            .await
            .unwrap_err();

        assert_eq!(failure.category, ErrorCategory::UnknownError);
        assert_eq!(failure.details, "task returned no result");
        assert_eq!(failure.task_ids.len(), 2);
        assert_eq!(queue.revoked(), failure.task_ids);
    }

    #[tokio::test]
    async fn revoked_during_wait_maps_to_task_revoked() {
        let id = JobId::new();
        let queue = Arc::new(ScriptedQueue::default().wait_returns(Err(QueueError::Revoked(id))));

        let failure = orchestrator(queue)
            .trigger(&target(), wait_for(5))
            .await
            .unwrap_err();

        assert_eq!(failure.category, ErrorCategory::TaskRevoked);
    }

    #[tokio::test(start_paused = true)]
    async fn local_deadline_is_pending_not_failure() {
        let queue = Arc::new(ScriptedQueue::default());
        let orch = orchestrator(queue.clone());

        let outcome = orch.await_result(&stub_handle(), Duration::from_secs(5)).await;
        assert_eq!(
            outcome.unwrap(),
            WaitOutcome::Pending(PendingReason::LocalDeadline)
        );

        let report = orch.trigger(&target(), wait_for(5)).await.unwrap();
        assert_eq!(
            report.progress,
            ChainProgress::StillRunning(PendingReason::LocalDeadline)
        );
        assert!(queue.revoked().is_empty());
    }

    #[tokio::test]
    async fn queue_timeout_is_pending_not_failure() {
        let queue = Arc::new(
            ScriptedQueue::default().wait_returns(Err(QueueError::Timeout("backend slow".into()))),
        );

        let report = orchestrator(queue.clone())
            .trigger(&target(), wait_for(5))
            .await
            .unwrap();

        assert_eq!(
            report.progress,
            ChainProgress::StillRunning(PendingReason::QueueTimeout)
        );
        assert!(queue.revoked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_pipeline_times_out_and_keeps_running() {
        let queue = Arc::new(InMemoryJobQueue::new());
        register_pipeline(
            &queue,
            PipelineDeps {
                analyzer: Arc::new(
                    SimulatedSentimentAnalyzer::new(30.0).with_delay(Duration::from_secs(60)),
                ),
                ..PipelineDeps::simulated()
            },
        );
        let orch = orchestrator(queue.clone());

        let report = orch.trigger(&target(), wait_for(5)).await.unwrap();

        assert_eq!(
            report.progress,
            ChainProgress::StillRunning(PendingReason::QueueTimeout)
        );
        assert_eq!(report.task_ids.len(), 2);
        assert_eq!(
            queue.state(report.task_ids[0]).await.unwrap(),
            JobState::Running
        );
        assert_eq!(
            queue.state(report.task_ids[1]).await.unwrap(),
            JobState::Pending
        );
    }

    /// Real queue whose first stage is `first` and whose stake stage echoes its input.
    fn queue_with_first_stage<F, Fut>(first: F) -> Arc<InMemoryJobQueue>
    where
        F: Fn(crate::jobs::StageContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JsonValue, String>> + Send + 'static,
    {
        let queue = Arc::new(InMemoryJobQueue::new());
        queue.register_handler(SENTIMENT_STAGE, first);
        queue.register_handler(STAKE_STAGE, |ctx: crate::jobs::StageContext| async move {
            Ok(ctx.arg(0).cloned().unwrap_or_default())
        });
        queue
    }

    #[tokio::test(start_paused = true)]
    async fn first_stage_hard_limit_is_a_timeout_and_revokes_the_chain() {
        let queue = queue_with_first_stage(|_ctx| async {
            tokio::time::sleep(Duration::from_secs(100)).await;
            Ok(json!({ "sentiment_score": 10.0 }))
        });

        let failure = orchestrator(queue.clone())
            .trigger(&target(), wait_for(30))
            .await
            .unwrap_err();

        assert_eq!(failure.category, ErrorCategory::TimeoutError);
        assert_eq!(failure.task_ids.len(), 2);
        assert_eq!(failure.metrics.attempts, 2);
        assert_eq!(failure.metrics.failures, 0);
        for id in &failure.task_ids {
            assert_eq!(queue.state(*id).await.unwrap(), JobState::TimedOut);
        }
    }

    #[tokio::test]
    async fn first_stage_error_is_unknown_and_revokes_the_chain() {
        let queue = queue_with_first_stage(|_ctx| async { Err("analyzer crashed".to_string()) });

        let failure = orchestrator(queue.clone())
            .trigger(&target(), wait_for(5))
            .await
            .unwrap_err();

        assert_eq!(failure.category, ErrorCategory::UnknownError);
        assert!(!failure.details.contains("analyzer crashed"));
        assert_eq!(failure.task_ids.len(), 2);
        assert_eq!(failure.metrics.attempts, 2);
        assert_eq!(queue.state(failure.task_ids[1]).await.unwrap(), JobState::Failed);
    }

    #[tokio::test]
    async fn completed_pipeline_returns_stake_result() {
        let queue = Arc::new(InMemoryJobQueue::new());
        register_pipeline(&queue, PipelineDeps::simulated());

        let report = orchestrator(queue)
            .trigger(&target(), wait_for(5))
            .await
            .unwrap();

        assert!(!report.lineage_truncated);
        assert_eq!(report.task_ids.len(), 2);
        match report.progress {
            ChainProgress::Completed(result) => {
                assert_eq!(result["success"], json!(true));
                assert_eq!(result["operation"], json!("add_stake"));
            }
            other => panic!("unexpected progress: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_wait_returns_every_stage_id() {
        let queue = Arc::new(ScriptedQueue::default());

        let report = orchestrator(queue.clone())
            .trigger(
                &target(),
                TriggerOptions {
                    wait: false,
                    timeout: Duration::from_secs(5),
                },
            )
            .await
            .unwrap();

        assert_eq!(report.progress, ChainProgress::Submitted);
        assert_eq!(report.task_ids.len(), 2);
        assert_eq!(queue.parent_of(report.task_ids[1]), Some(report.task_ids[0]));
    }
}
