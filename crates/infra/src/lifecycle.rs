//! Job lifecycle: scoped tracking and best-effort revocation of chain jobs.
//!
//! ## Design
//!
//! - Every job created for a request is tracked in one `OrchestrationScope`
//! - The scope is closed exactly once with the request's outcome
//! - A failed outcome revokes every tracked job, each independently
//! - Transient revocation failures are retried with a fixed delay

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use taodiv_core::{JobId, Settings};

use crate::errors::{ErrorCategory, OrchestrationError, classify};
use crate::jobs::{FailureClass, JobHandle, JobQueue};

/// Retry policy for revocation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevocationPolicy {
    /// Additional attempts after the first (0 = no retries)
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for RevocationPolicy {
    fn default() -> Self {
        Self::fixed(2, Duration::from_millis(500))
    }
}

impl RevocationPolicy {
    pub fn fixed(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::fixed(settings.revoke_max_retries, settings.revoke_retry_delay)
    }
}

/// Revocation counters for one orchestration attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevocationMetrics {
    /// Handles a revocation was attempted for (retries not counted)
    pub attempts: u32,
    /// Handles that could not be revoked
    pub failures: u32,
    pub connection_errors: u32,
    pub timeout_errors: u32,
    pub other_errors: u32,
}

impl RevocationMetrics {
    fn record(&mut self, class: FailureClass) {
        match class {
            FailureClass::Connection => self.connection_errors += 1,
            FailureClass::Timeout => self.timeout_errors += 1,
            FailureClass::Other => self.other_errors += 1,
        }
    }
}

/// Revokes jobs through the queue with the configured retry policy.
#[derive(Clone)]
pub struct RevocationManager {
    queue: Arc<dyn JobQueue>,
    policy: RevocationPolicy,
}

impl RevocationManager {
    pub fn new(queue: Arc<dyn JobQueue>, policy: RevocationPolicy) -> Self {
        Self { queue, policy }
    }

    pub fn policy(&self) -> RevocationPolicy {
        self.policy
    }

    /// Open a scope for one orchestration attempt.
    pub fn scope(&self) -> OrchestrationScope {
        OrchestrationScope {
            manager: self.clone(),
            tracked: Vec::new(),
            closed: false,
        }
    }

    /// Terminate-revoke one job. Returns whether the revocation went through.
    pub async fn revoke(&self, id: JobId, metrics: &mut RevocationMetrics) -> bool {
        metrics.attempts += 1;
        let mut retries = 0;

        loop {
            match self.queue.revoke(id, true).await {
                Ok(()) => {
                    debug!(job_id = %id, retries, "job revoked");
                    return true;
                }
                Err(err) => {
                    let class = err.class();
                    metrics.record(class);

                    if class.is_transient() && retries < self.policy.max_retries {
                        retries += 1;
                        warn!(
                            job_id = %id,
                            retry = retries,
                            max_retries = self.policy.max_retries,
                            error = %err,
                            "revocation failed; retrying"
                        );
                        tokio::time::sleep(self.policy.retry_delay).await;
                        continue;
                    }

                    metrics.failures += 1;
                    error!(
                        job_id = %id,
                        attempts = retries + 1,
                        error = %err,
                        "revocation failed; giving up"
                    );
                    return false;
                }
            }
        }
    }

    /// Revoke every id; one failure never stops the others.
    pub async fn revoke_all(&self, ids: &[JobId]) -> RevocationMetrics {
        let mut metrics = RevocationMetrics::default();
        for id in ids {
            self.revoke(*id, &mut metrics).await;
        }
        metrics
    }

    /// Revoke `ids`, then classify `err`.
    pub async fn cleanup_and_classify(
        &self,
        err: &OrchestrationError,
        ids: &[JobId],
    ) -> (ErrorCategory, String, RevocationMetrics) {
        let metrics = self.revoke_all(ids).await;
        let (category, details) = classify(err);
        (category, details, metrics)
    }
}

/// Jobs created during one orchestration attempt.
///
/// Must be finished with `close` or `fail`; dropping a scope that still tracks
/// jobs logs an error and revokes nothing.
pub struct OrchestrationScope {
    manager: RevocationManager,
    tracked: Vec<JobId>,
    closed: bool,
}

impl OrchestrationScope {
    pub fn track(&mut self, handle: &JobHandle) {
        self.tracked.push(handle.id);
    }

    pub fn track_id(&mut self, id: JobId) {
        if !self.tracked.contains(&id) {
            self.tracked.push(id);
        }
    }

    pub fn tracked_ids(&self) -> &[JobId] {
        &self.tracked
    }

    /// Close with the outcome. A failed outcome revokes every tracked job.
    pub async fn close(mut self, failed: bool) -> RevocationMetrics {
        self.closed = true;

        if !failed {
            debug!(tracked = ?self.tracked, "scope closed; no revocation");
            return RevocationMetrics::default();
        }
        if self.tracked.is_empty() {
            debug!("scope failed with no jobs to revoke");
            return RevocationMetrics::default();
        }

        let metrics = self.manager.revoke_all(&self.tracked).await;
        info!(
            tracked = self.tracked.len(),
            attempts = metrics.attempts,
            failures = metrics.failures,
            connection_errors = metrics.connection_errors,
            timeout_errors = metrics.timeout_errors,
            other_errors = metrics.other_errors,
            "scope closed after failure; revocation pass finished"
        );
        metrics
    }

    /// Close as failed: revoke everything tracked, then classify `err`.
    pub async fn fail(
        mut self,
        err: &OrchestrationError,
    ) -> (ErrorCategory, String, RevocationMetrics) {
        self.closed = true;
        let tracked = std::mem::take(&mut self.tracked);
        let result = self.manager.cleanup_and_classify(err, &tracked).await;
        info!(
            category = %result.0,
            tracked = tracked.len(),
            attempts = result.2.attempts,
            failures = result.2.failures,
            "scope failed; revocation pass finished"
        );
        result
    }
}

impl Drop for OrchestrationScope {
    fn drop(&mut self) {
        if !self.closed && !self.tracked.is_empty() {
            error!(tracked = ?self.tracked, "orchestration scope dropped without close; jobs left running");
        }
    }
}
