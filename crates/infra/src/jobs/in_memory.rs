//! In-process job queue: executes registered stage handlers on tokio tasks.
//!
//! Stands in for the broker plus its out-of-process workers. Each submitted
//! chain gets one runner task that executes the stages in order, enforcing
//! each stage's soft (warning) and hard (termination) limits. Finished jobs
//! stay queryable for a retention window and are evicted on the next submit.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use taodiv_core::JobId;

use super::queue::{JobQueue, QueueError, SubmitError};
use super::types::{ChainSpec, JobHandle, JobState};

/// How long a finished job stays queryable by default.
pub const DEFAULT_RESULT_RETENTION: Duration = Duration::from_secs(3600);

/// Boxed future returned by a stage handler.
pub type StageFuture = Pin<Box<dyn Future<Output = Result<JsonValue, String>> + Send>>;

/// Stage handler function type.
pub type StageHandler = Arc<dyn Fn(StageContext) -> StageFuture + Send + Sync>;

/// What a stage handler receives when it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: JobId,
    /// Positional arguments; for every stage but the first, `args[0]` is the
    /// previous stage's result.
    pub args: Vec<JsonValue>,
    soft_deadline: Instant,
}

impl StageContext {
    /// Whether the stage has run past its soft limit.
    pub fn soft_limit_exceeded(&self) -> bool {
        Instant::now() >= self.soft_deadline
    }

    /// Time left before the soft limit.
    pub fn soft_remaining(&self) -> Duration {
        self.soft_deadline.saturating_duration_since(Instant::now())
    }

    pub fn arg(&self, index: usize) -> Option<&JsonValue> {
        self.args.get(index)
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    /// When the job reached a terminal state.
    pub finished_at: Option<Instant>,
}

impl JobSnapshot {
    fn pending() -> Self {
        Self {
            state: JobState::Pending,
            result: None,
            error: None,
            finished_at: None,
        }
    }

    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

struct JobEntry {
    handle: JobHandle,
    state: watch::Sender<JobSnapshot>,
    cancel: Notify,
    revoke_requested: AtomicBool,
}

impl JobEntry {
    fn current(&self) -> JobState {
        self.state.borrow().state
    }

    fn finish(&self, state: JobState, result: Option<JsonValue>, error: Option<String>) {
        self.state.send_modify(|s| {
            s.state = state;
            s.result = result;
            s.error = error;
            s.finished_at = Some(Instant::now());
        });
    }
}

enum StageOutcome {
    Succeeded(JsonValue),
    Failed,
    Revoked,
    TimedOut,
}

/// In-memory job queue for tests/dev.
pub struct InMemoryJobQueue {
    handlers: RwLock<HashMap<String, StageHandler>>,
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    retention: Duration,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RESULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Register the handler executed for stages named `name`.
    pub fn register_handler<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, String>> + Send + 'static,
    {
        let handler: StageHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.handlers.write().unwrap().insert(name.into(), handler);
    }

    /// Full snapshot of a job (state, result, error).
    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .map(|e| e.state.borrow().clone())
    }

    /// Drop finished jobs older than the retention window; returns how many.
    pub fn evict_finished(&self) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.state.borrow().expired(now, self.retention));
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted, remaining = jobs.len(), "finished jobs evicted");
        }
        evicted
    }

    fn entry(&self, id: JobId) -> Result<Arc<JobEntry>, QueueError> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(QueueError::NotFound(id))
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn submit_chain(&self, chain: &ChainSpec) -> Result<Vec<JobHandle>, SubmitError> {
        self.evict_finished();

        // Resolve every handler up front so a bad chain creates nothing.
        let handlers = {
            let registered = self.handlers.read().unwrap();
            chain
                .stages()
                .iter()
                .map(|stage| {
                    registered.get(stage.name()).cloned().ok_or_else(|| {
                        SubmitError::nothing_created(QueueError::Rejected(format!(
                            "no handler registered for stage `{}`",
                            stage.name()
                        )))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut parent = None;
        let mut plan = Vec::with_capacity(chain.len());
        for (stage, handler) in chain.stages().iter().zip(handlers) {
            let handle = JobHandle {
                id: JobId::new(),
                name: stage.name().to_string(),
                parent,
                limits: stage.limits(),
            };
            parent = Some(handle.id);

            let (state, _) = watch::channel(JobSnapshot::pending());
            let entry = Arc::new(JobEntry {
                handle,
                state,
                cancel: Notify::new(),
                revoke_requested: AtomicBool::new(false),
            });
            plan.push((entry, handler, stage.args().to_vec()));
        }

        let handles: Vec<JobHandle> = plan.iter().map(|(e, _, _)| e.handle.clone()).collect();
        {
            let mut jobs = self.jobs.write().unwrap();
            for (entry, _, _) in &plan {
                jobs.insert(entry.handle.id, entry.clone());
            }
        }

        info!(
            stages = handles.len(),
            first = %handles[0].id,
            last = %handles[handles.len() - 1].id,
            "chain submitted"
        );
        tokio::spawn(run_chain(plan));

        Ok(handles)
    }

    async fn wait_result(
        &self,
        id: JobId,
        timeout: Duration,
    ) -> Result<Option<JsonValue>, QueueError> {
        let entry = self.entry(id)?;
        let mut rx = entry.state.subscribe();

        let snapshot = match tokio::time::timeout(timeout, rx.wait_for(|s| s.state.is_terminal()))
            .await
        {
            Err(_) => return Ok(None),
            Ok(Err(_)) => {
                return Err(QueueError::Connection(format!(
                    "result channel for job {id} closed"
                )));
            }
            Ok(Ok(snapshot)) => (*snapshot).clone(),
        };

        match snapshot.state {
            JobState::Succeeded => Ok(Some(snapshot.result.unwrap_or(JsonValue::Null))),
            JobState::Revoked => Err(QueueError::Revoked(id)),
            JobState::TimedOut => Err(QueueError::ExecutionTimeout(id)),
            JobState::Failed => Err(QueueError::StageFailed {
                id,
                message: snapshot.error.unwrap_or_default(),
            }),
            JobState::Pending | JobState::Running => Ok(None),
        }
    }

    async fn revoke(&self, id: JobId, terminate: bool) -> Result<(), QueueError> {
        let entry = self.entry(id)?;

        let mut was_running = false;
        let revoked_pending = entry.state.send_if_modified(|s| match s.state {
            JobState::Pending => {
                s.state = JobState::Revoked;
                s.error = Some("revoked before start".to_string());
                s.finished_at = Some(Instant::now());
                true
            }
            JobState::Running => {
                was_running = true;
                false
            }
            _ => false,
        });

        if revoked_pending {
            info!(job_id = %id, "pending job revoked");
        } else if was_running {
            if terminate {
                entry.cancel.notify_one();
                info!(job_id = %id, "running job signalled to terminate");
            } else {
                entry.revoke_requested.store(true, Ordering::SeqCst);
                info!(job_id = %id, "revocation recorded; running job will not be marked succeeded");
            }
        } else {
            debug!(job_id = %id, state = %entry.current(), "revoke ignored for finished job");
        }

        Ok(())
    }

    async fn state(&self, id: JobId) -> Result<JobState, QueueError> {
        Ok(self.entry(id)?.current())
    }

    fn parent_of(&self, id: JobId) -> Option<JobId> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .and_then(|e| e.handle.parent)
    }
}

async fn run_chain(plan: Vec<(Arc<JobEntry>, StageHandler, Vec<JsonValue>)>) {
    let mut previous: Option<JsonValue> = None;
    let mut stages = plan.into_iter();

    while let Some((entry, handler, args)) = stages.next() {
        let outcome = run_stage(&entry, &handler, previous.take(), args).await;
        if let StageOutcome::Succeeded(value) = outcome {
            previous = Some(value);
            continue;
        }

        // The chain is broken; downstream stages never run and inherit the cause.
        let upstream = entry.handle.id;
        let (state, reason) = match outcome {
            StageOutcome::Revoked => (JobState::Revoked, "was revoked"),
            StageOutcome::TimedOut => (JobState::TimedOut, "exceeded its hard time limit"),
            _ => (JobState::Failed, "did not succeed"),
        };
        for (rest, _, _) in stages.by_ref() {
            rest.finish(state, None, Some(format!("upstream job {upstream} {reason}")));
        }
        return;
    }
}

async fn run_stage(
    entry: &JobEntry,
    handler: &StageHandler,
    previous: Option<JsonValue>,
    mut args: Vec<JsonValue>,
) -> StageOutcome {
    let id = entry.handle.id;
    let stage = entry.handle.name.as_str();
    let limits = entry.handle.limits;

    let started_running = entry.state.send_if_modified(|s| {
        if s.state == JobState::Pending {
            s.state = JobState::Running;
            true
        } else {
            false
        }
    });
    if !started_running {
        debug!(job_id = %id, stage, "stage skipped; revoked before start");
        return StageOutcome::Revoked;
    }

    if let Some(previous) = previous {
        args.insert(0, previous);
    }

    let started = Instant::now();
    debug!(job_id = %id, stage, "stage started");

    let fut = handler(StageContext {
        job_id: id,
        args,
        soft_deadline: started + limits.soft(),
    });
    tokio::pin!(fut);
    let soft = tokio::time::sleep(limits.soft());
    tokio::pin!(soft);
    let hard = tokio::time::sleep(limits.hard());
    tokio::pin!(hard);
    let mut soft_fired = false;

    let result = loop {
        tokio::select! {
            res = &mut fut => break res,
            _ = &mut soft, if !soft_fired => {
                soft_fired = true;
                warn!(job_id = %id, stage, limit = ?limits.soft(), "stage exceeded its soft time limit");
            }
            _ = &mut hard => {
                warn!(job_id = %id, stage, limit = ?limits.hard(), "stage exceeded its hard time limit; terminated");
                entry.finish(JobState::TimedOut, None, Some("hard time limit exceeded".to_string()));
                return StageOutcome::TimedOut;
            }
            _ = entry.cancel.notified() => {
                info!(job_id = %id, stage, "stage terminated by revocation");
                entry.finish(JobState::Revoked, None, Some("terminated by revocation".to_string()));
                return StageOutcome::Revoked;
            }
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(_) if entry.revoke_requested.load(Ordering::SeqCst) => {
            info!(job_id = %id, stage, elapsed_ms, "stage finished after revocation; result discarded");
            entry.finish(JobState::Revoked, None, Some("revoked while running".to_string()));
            StageOutcome::Revoked
        }
        Ok(value) => {
            debug!(job_id = %id, stage, elapsed_ms, "stage succeeded");
            entry.finish(JobState::Succeeded, Some(value.clone()), None);
            StageOutcome::Succeeded(value)
        }
        Err(error) => {
            warn!(job_id = %id, stage, elapsed_ms, error = %error, "stage failed");
            entry.finish(JobState::Failed, None, Some(error));
            StageOutcome::Failed
        }
    }
}
