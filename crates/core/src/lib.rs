//! `taodiv-core`: domain building blocks for the dividends service.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the dividend query/record pair, cache key derivation and the
//! process settings.

pub mod cache_key;
pub mod dividend;
pub mod error;
pub mod id;
pub mod settings;

pub use cache_key::{CACHE_KEY_PREFIX, CacheKey};
pub use dividend::{DividendQuery, DividendRecord, ResolvedTarget};
pub use error::{DomainError, DomainResult};
pub use id::{Hotkey, JobId, NetUid};
pub use settings::{Settings, StageLimitSettings};
