//! Core job types: handles, states, time limits and chain specs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use taodiv_core::{JobId, StageLimitSettings};

/// Upper bound on the number of stages in one chain.
pub const MAX_CHAIN_LEN: usize = 16;

/// Errors raised while building job specifications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobSpecError {
    #[error("a chain needs at least one stage")]
    EmptyChain,
    #[error("chain has {len} stages, the maximum is {max}")]
    ChainTooLong { len: usize, max: usize },
    #[error("soft limit {soft:?} exceeds hard limit {hard:?}")]
    InvalidLimits { soft: Duration, hard: Duration },
    #[error("stage name must not be empty")]
    EmptyStageName,
}

/// Soft and hard execution limits for a job.
///
/// The soft limit is a warning threshold the stage may react to; the hard
/// limit terminates the job. `soft <= hard` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    soft: Duration,
    hard: Duration,
}

impl TimeLimits {
    pub fn new(soft: Duration, hard: Duration) -> Result<Self, JobSpecError> {
        if soft > hard {
            return Err(JobSpecError::InvalidLimits { soft, hard });
        }
        Ok(Self { soft, hard })
    }

    pub fn from_settings(limits: &StageLimitSettings) -> Result<Self, JobSpecError> {
        Self::new(limits.soft(), limits.hard())
    }

    pub fn soft(&self) -> Duration {
        self.soft
    }

    pub fn hard(&self) -> Duration {
        self.hard
    }
}

/// Job execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Queued, waiting for its turn in the chain
    Pending,
    /// Currently being executed
    Running,
    /// Completed successfully
    Succeeded,
    /// Stage raised an error, or an upstream stage did not succeed
    Failed,
    /// Cancelled before completing
    Revoked,
    /// Exceeded its hard time limit
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Revoked | JobState::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Revoked => "REVOKED",
            JobState::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a submitted job.
///
/// `parent` names the previous stage of the chain. It is an identifier, not an
/// owned handle; lineage is rebuilt by resolving it through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub name: String,
    pub parent: Option<JobId>,
    pub limits: TimeLimits,
}

/// One stage of a chain: a named callable, its arguments and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    name: String,
    args: Vec<JsonValue>,
    limits: TimeLimits,
}

impl StageSpec {
    pub fn new(
        name: impl Into<String>,
        args: Vec<JsonValue>,
        limits: TimeLimits,
    ) -> Result<Self, JobSpecError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(JobSpecError::EmptyStageName);
        }
        Ok(Self { name, args, limits })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[JsonValue] {
        &self.args
    }

    pub fn limits(&self) -> TimeLimits {
        self.limits
    }
}

/// Ordered, immutable sequence of stages.
///
/// Stage N's result is passed to stage N+1 as its first argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSpec {
    stages: Vec<StageSpec>,
}

impl ChainSpec {
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, JobSpecError> {
        if stages.is_empty() {
            return Err(JobSpecError::EmptyChain);
        }
        if stages.len() > MAX_CHAIN_LEN {
            return Err(JobSpecError::ChainTooLong {
                len: stages.len(),
                max: MAX_CHAIN_LEN,
            });
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
