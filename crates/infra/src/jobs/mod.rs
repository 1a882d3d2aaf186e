//! Background job model: chained stages on a queue.
//!
//! ## Design
//!
//! - A chain is an ordered, immutable list of stages submitted as one unit
//! - Each job records its parent (the previous stage) by identifier
//! - Soft limits warn, hard limits terminate
//! - Revocation cancels pending jobs and may interrupt running ones
//!
//! ## Components
//!
//! - `ChainSpec` / `StageSpec`: what to run
//! - `JobHandle`: reference to a submitted job
//! - `JobQueue`: broker/result-backend abstraction
//! - `InMemoryJobQueue`: tokio-backed queue running registered stage handlers
//! - `ChainLineage`: depth-bounded parent walk

pub mod in_memory;
pub mod lineage;
pub mod queue;
pub mod types;

pub use in_memory::{
    DEFAULT_RESULT_RETENTION, InMemoryJobQueue, JobSnapshot, StageContext, StageHandler,
};
pub use lineage::{ChainLineage, DEFAULT_MAX_DEPTH};
pub use queue::{FailureClass, JobQueue, QueueError, SubmitError};
pub use types::{ChainSpec, JobHandle, JobSpecError, JobState, MAX_CHAIN_LEN, StageSpec, TimeLimits};
