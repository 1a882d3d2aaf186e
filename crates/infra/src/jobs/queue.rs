//! Job queue abstraction (the broker/result-backend collaborator).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use taodiv_core::JobId;

use super::types::{ChainSpec, JobHandle, JobState};

/// Job queue abstraction.
///
/// Stage ordering within a chain is the queue's responsibility: stage N+1
/// never starts before stage N succeeded.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit every stage of `chain` as one unit.
    ///
    /// Returns the handles in submission order; each handle's `parent` is the
    /// previous stage. On failure, `SubmitError::created` lists any handles the
    /// queue had already created so the caller can revoke them.
    async fn submit_chain(&self, chain: &ChainSpec) -> Result<Vec<JobHandle>, SubmitError>;

    /// Wait up to `timeout` for a job to reach a terminal state.
    ///
    /// - `Ok(Some(value))`: the job succeeded (the value may be `null`)
    /// - `Ok(None)`: the job was not terminal within `timeout`
    /// - `Err(..)`: the job failed, was revoked, timed out, or the backend failed
    async fn wait_result(
        &self,
        id: JobId,
        timeout: Duration,
    ) -> Result<Option<JsonValue>, QueueError>;

    /// Request cancellation. With `terminate`, a running job is interrupted.
    async fn revoke(&self, id: JobId, terminate: bool) -> Result<(), QueueError>;

    /// Current state of a job.
    async fn state(&self, id: JobId) -> Result<JobState, QueueError>;

    /// Parent of a job, as recorded at submission.
    fn parent_of(&self, id: JobId) -> Option<JobId>;
}

/// Broad failure class, used to decide whether an operation is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Connection,
    Timeout,
    Other,
}

impl FailureClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureClass::Connection | FailureClass::Timeout)
    }
}

/// Job queue error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),
    #[error("queue operation timed out: {0}")]
    Timeout(String),
    #[error("job {0} was revoked")]
    Revoked(JobId),
    #[error("job {0} exceeded its execution time limit")]
    ExecutionTimeout(JobId),
    #[error("job {id} failed: {message}")]
    StageFailed { id: JobId, message: String },
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("queue rejected the request: {0}")]
    Rejected(String),
}

impl QueueError {
    pub fn class(&self) -> FailureClass {
        match self {
            QueueError::Connection(_) => FailureClass::Connection,
            QueueError::Timeout(_) => FailureClass::Timeout,
            _ => FailureClass::Other,
        }
    }
}

/// Failed chain submission.
#[derive(Debug, Clone, thiserror::Error)]
#[error("chain submission failed after {} job(s) were created: {source}", .created.len())]
pub struct SubmitError {
    /// Handles that exist despite the failure.
    pub created: Vec<JobHandle>,
    #[source]
    pub source: QueueError,
}

impl SubmitError {
    /// Failure before anything was created.
    pub fn nothing_created(source: QueueError) -> Self {
        Self {
            created: Vec::new(),
            source,
        }
    }
}
