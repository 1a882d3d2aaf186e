//! Infrastructure layer: cache stores, dividend gateway, job queue and
//! chain orchestration.

pub mod cache;
pub mod errors;
pub mod gateway;
pub mod jobs;
pub mod lifecycle;
pub mod orchestration;
pub mod source;
pub mod stages;

pub use errors::{ErrorCategory, OrchestrationError, classify};
pub use gateway::{DividendGateway, GatewayError, PurgeScope, Resolved};
pub use lifecycle::{OrchestrationScope, RevocationManager, RevocationMetrics, RevocationPolicy};
pub use orchestration::{
    ChainFailure, ChainOrchestrator, ChainProgress, ChainReport, OrchestratorConfig,
    PendingReason, TriggerOptions, WaitOutcome,
};
pub use source::{DividendSource, SimulatedDividendSource, SourceError};
