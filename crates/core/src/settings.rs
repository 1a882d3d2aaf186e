//! Process settings, loaded from environment variables.

use core::str::FromStr;
use std::time::Duration;

use crate::error::{DomainError, DomainResult};
use crate::id::{Hotkey, NetUid};

const DEFAULT_HOTKEY: &str = "5FFApaS75bv5pJHfAp2FVLBj9ZaXuFDjEypsaBNc1wCfe52v";

/// Soft/hard execution limits for one pipeline stage, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLimitSettings {
    pub soft_secs: u64,
    pub hard_secs: u64,
}

impl StageLimitSettings {
    pub fn soft(&self) -> Duration {
        Duration::from_secs(self.soft_secs)
    }

    pub fn hard(&self) -> Duration {
        Duration::from_secs(self.hard_secs)
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Expected value of the `X-API-Key` header.
    pub api_key: String,
    pub bind_addr: String,
    pub redis_url: String,
    pub use_redis_cache: bool,
    pub cache_ttl: Duration,
    pub default_netuid: NetUid,
    pub default_hotkey: Hotkey,
    /// Artificial latency of the simulated chain query.
    pub query_delay: Duration,
    pub revoke_max_retries: u32,
    pub revoke_retry_delay: Duration,
    pub lineage_max_depth: usize,
    pub sentiment_limits: StageLimitSettings,
    pub stake_limits: StageLimitSettings,
    pub default_wait_timeout: Duration,
    /// How long finished jobs stay queryable in the in-process queue.
    pub job_result_retention: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            bind_addr: "0.0.0.0:8000".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            use_redis_cache: false,
            cache_ttl: Duration::from_secs(120),
            default_netuid: NetUid::new(18),
            default_hotkey: Hotkey::parse(DEFAULT_HOTKEY).expect("default hotkey is valid"),
            query_delay: Duration::ZERO,
            revoke_max_retries: 2,
            revoke_retry_delay: Duration::from_millis(500),
            lineage_max_depth: 10,
            sentiment_limits: StageLimitSettings {
                soft_secs: 12,
                hard_secs: 15,
            },
            stake_limits: StageLimitSettings {
                soft_secs: 16,
                hard_secs: 20,
            },
            default_wait_timeout: Duration::from_secs(10),
            job_result_retention: Duration::from_secs(3600),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings from an arbitrary variable lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_hotkey = match lookup("DEFAULT_HOTKEY") {
            Some(raw) => Hotkey::parse(raw)
                .map_err(|e| DomainError::configuration(format!("DEFAULT_HOTKEY: {e}")))?,
            None => defaults.default_hotkey,
        };

        let settings = Self {
            api_key: lookup("API_KEY").unwrap_or(defaults.api_key),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            use_redis_cache: parse_or(&lookup, "USE_REDIS_CACHE", defaults.use_redis_cache)?,
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_TTL_SECONDS",
                defaults.cache_ttl.as_secs(),
            )?),
            default_netuid: NetUid::new(parse_or(
                &lookup,
                "DEFAULT_NETUID",
                defaults.default_netuid.get(),
            )?),
            default_hotkey,
            query_delay: Duration::from_millis(parse_or(&lookup, "QUERY_DELAY_MS", 0)?),
            revoke_max_retries: parse_or(
                &lookup,
                "REVOKE_MAX_RETRIES",
                defaults.revoke_max_retries,
            )?,
            revoke_retry_delay: Duration::from_millis(parse_or(
                &lookup,
                "REVOKE_RETRY_DELAY_MS",
                defaults.revoke_retry_delay.as_millis() as u64,
            )?),
            lineage_max_depth: parse_or(
                &lookup,
                "LINEAGE_MAX_DEPTH",
                defaults.lineage_max_depth,
            )?,
            sentiment_limits: StageLimitSettings {
                soft_secs: parse_or(
                    &lookup,
                    "SENTIMENT_SOFT_LIMIT_SECS",
                    defaults.sentiment_limits.soft_secs,
                )?,
                hard_secs: parse_or(
                    &lookup,
                    "SENTIMENT_HARD_LIMIT_SECS",
                    defaults.sentiment_limits.hard_secs,
                )?,
            },
            stake_limits: StageLimitSettings {
                soft_secs: parse_or(
                    &lookup,
                    "STAKE_SOFT_LIMIT_SECS",
                    defaults.stake_limits.soft_secs,
                )?,
                hard_secs: parse_or(
                    &lookup,
                    "STAKE_HARD_LIMIT_SECS",
                    defaults.stake_limits.hard_secs,
                )?,
            },
            default_wait_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DEFAULT_WAIT_TIMEOUT_SECS",
                defaults.default_wait_timeout.as_secs(),
            )?),
            job_result_retention: Duration::from_secs(parse_or(
                &lookup,
                "JOB_RESULT_RETENTION_SECS",
                defaults.job_result_retention.as_secs(),
            )?),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> DomainResult<()> {
        for (name, limits) in [
            ("sentiment", self.sentiment_limits),
            ("stake", self.stake_limits),
        ] {
            if limits.soft_secs > limits.hard_secs {
                return Err(DomainError::configuration(format!(
                    "{name} soft limit ({}s) exceeds hard limit ({}s)",
                    limits.soft_secs, limits.hard_secs
                )));
            }
        }
        if self.lineage_max_depth == 0 {
            return Err(DomainError::configuration("LINEAGE_MAX_DEPTH must be at least 1"));
        }
        if self.cache_ttl.is_zero() {
            return Err(DomainError::configuration("CACHE_TTL_SECONDS must be positive"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> DomainResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DomainError::configuration(format!("{name}={raw}: {e}"))),
        None => Ok(default),
    }
}
