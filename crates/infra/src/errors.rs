//! Orchestration error taxonomy.
//!
//! Every orchestration failure is an `OrchestrationError`; `classify` maps it
//! onto the closed `ErrorCategory` set with a sanitized detail string. Raw
//! error text only ever reaches the logs.

use serde::{Deserialize, Serialize};
use tracing::error;

use taodiv_core::JobId;

use crate::jobs::{JobSpecError, QueueError, SubmitError};

/// Externally visible failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    TaskCreation,
    TaskChaining,
    UpstreamError,
    TaskRevoked,
    TimeoutError,
    UnknownError,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::TaskCreation,
        ErrorCategory::TaskChaining,
        ErrorCategory::UpstreamError,
        ErrorCategory::TaskRevoked,
        ErrorCategory::TimeoutError,
        ErrorCategory::UnknownError,
    ];

    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::TaskCreation => "TASK_CREATION",
            ErrorCategory::TaskChaining => "TASK_CHAINING",
            ErrorCategory::UpstreamError => "UPSTREAM_ERROR",
            ErrorCategory::TaskRevoked => "TASK_REVOKED",
            ErrorCategory::TimeoutError => "TIMEOUT_ERROR",
            ErrorCategory::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Template message shown to callers.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCategory::TaskCreation => "Failed to create background task",
            ErrorCategory::TaskChaining => "Failed to chain background tasks",
            ErrorCategory::UpstreamError => "Upstream service unavailable",
            ErrorCategory::TaskRevoked => "Background task was revoked",
            ErrorCategory::TimeoutError => "Background task timed out",
            ErrorCategory::UnknownError => "An unexpected error occurred",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure raised while submitting, waiting on, or chaining jobs.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("chain submission failed before any job was created: {0}")]
    TaskCreation(#[source] QueueError),

    #[error("chain submission failed after {} job(s) were created: {source}", .created.len())]
    TaskChaining {
        created: Vec<JobId>,
        #[source]
        source: QueueError,
    },

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("job {0} was revoked")]
    Revoked(JobId),

    #[error("job {0} exceeded its execution time limit")]
    ExecutionTimeout(JobId),

    #[error("job {id} failed: {message}")]
    StageFailed { id: JobId, message: String },

    #[error("job {0} returned no result")]
    EmptyResult(JobId),

    #[error("invalid chain: {0}")]
    InvalidChain(#[from] JobSpecError),

    #[error("queue error: {0}")]
    Queue(#[source] QueueError),
}

impl OrchestrationError {
    /// Submission failure: creation if nothing exists yet, chaining otherwise.
    pub fn from_submit(err: SubmitError) -> Self {
        if err.created.is_empty() {
            OrchestrationError::TaskCreation(err.source)
        } else {
            OrchestrationError::TaskChaining {
                created: err.created.iter().map(|h| h.id).collect(),
                source: err.source,
            }
        }
    }

    /// Failure reported while waiting on a job.
    pub fn from_wait(err: QueueError) -> Self {
        match err {
            QueueError::Connection(message) => OrchestrationError::Upstream(message),
            QueueError::Revoked(id) => OrchestrationError::Revoked(id),
            QueueError::ExecutionTimeout(id) => OrchestrationError::ExecutionTimeout(id),
            QueueError::StageFailed { id, message } => {
                OrchestrationError::StageFailed { id, message }
            }
            other => OrchestrationError::Queue(other),
        }
    }
}

/// Map an orchestration failure to its category and caller-safe detail.
pub fn classify(err: &OrchestrationError) -> (ErrorCategory, String) {
    let (category, details) = match err {
        OrchestrationError::TaskCreation(_) | OrchestrationError::InvalidChain(_) => (
            ErrorCategory::TaskCreation,
            ErrorCategory::TaskCreation.message().to_string(),
        ),
        OrchestrationError::TaskChaining { created, .. } => (
            ErrorCategory::TaskChaining,
            format!(
                "{} ({} job(s) revoked)",
                ErrorCategory::TaskChaining.message(),
                created.len()
            ),
        ),
        OrchestrationError::Upstream(_) => (
            ErrorCategory::UpstreamError,
            ErrorCategory::UpstreamError.message().to_string(),
        ),
        OrchestrationError::Revoked(_) => (
            ErrorCategory::TaskRevoked,
            ErrorCategory::TaskRevoked.message().to_string(),
        ),
        OrchestrationError::ExecutionTimeout(_) => (
            ErrorCategory::TimeoutError,
            "Background task exceeded its time limit".to_string(),
        ),
        OrchestrationError::EmptyResult(_) => (
            ErrorCategory::UnknownError,
            "task returned no result".to_string(),
        ),
        OrchestrationError::StageFailed { .. } => (
            ErrorCategory::UnknownError,
            ErrorCategory::UnknownError.message().to_string(),
        ),
        OrchestrationError::Queue(source) => {
            let category = match source {
                QueueError::Connection(_) => ErrorCategory::UpstreamError,
                QueueError::Timeout(_) => ErrorCategory::TimeoutError,
                QueueError::Revoked(_) => ErrorCategory::TaskRevoked,
                QueueError::ExecutionTimeout(_) => ErrorCategory::TimeoutError,
                QueueError::StageFailed { .. }
                | QueueError::NotFound(_)
                | QueueError::Rejected(_) => ErrorCategory::UnknownError,
            };
            (category, category.message().to_string())
        }
    };

    error!(category = %category, error = %err, "orchestration failed");
    (category, details)
}
