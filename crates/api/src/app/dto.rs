use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use taodiv_core::{DividendQuery, DividendRecord, Hotkey, JobId, NetUid};
use taodiv_infra::{TriggerOptions, jobs::JobState};

use crate::app::errors;

/// Upper bound on a caller-supplied wait.
pub const MAX_WAIT_TIMEOUT_SECS: f64 = 60.0;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct DividendParams {
    pub netuid: Option<u16>,
    pub hotkey: Option<String>,
    #[serde(default)]
    pub trade: bool,
    #[serde(default)]
    pub wait: bool,
    /// Seconds.
    pub timeout: Option<f64>,
}

impl DividendParams {
    pub fn query(&self) -> Result<DividendQuery, axum::response::Response> {
        parse_query(self.netuid, self.hotkey.as_deref())
    }

    pub fn trigger_options(
        &self,
        default_timeout: Duration,
    ) -> Result<TriggerOptions, axum::response::Response> {
        let timeout = match self.timeout {
            None => default_timeout,
            Some(secs) if secs.is_finite() && secs > 0.0 && secs <= MAX_WAIT_TIMEOUT_SECS => {
                Duration::from_secs_f64(secs)
            }
            Some(_) => {
                return Err(errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_timeout",
                    format!("timeout must be greater than 0 and at most {MAX_WAIT_TIMEOUT_SECS} seconds"),
                ));
            }
        };
        Ok(TriggerOptions {
            wait: self.wait,
            timeout,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TargetParams {
    pub netuid: Option<u16>,
    pub hotkey: Option<String>,
}

impl TargetParams {
    pub fn query(&self) -> Result<DividendQuery, axum::response::Response> {
        parse_query(self.netuid, self.hotkey.as_deref())
    }
}

fn parse_query(
    netuid: Option<u16>,
    hotkey: Option<&str>,
) -> Result<DividendQuery, axum::response::Response> {
    // An empty `hotkey=` means "not given".
    let hotkey = match hotkey.filter(|h| !h.is_empty()) {
        None => None,
        Some(raw) => Some(Hotkey::parse(raw).map_err(|e| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_hotkey", e.to_string())
        })?),
    };
    Ok(DividendQuery::new(netuid.map(NetUid::new), hotkey))
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct DividendResponse {
    pub data: DividendRecord,
    pub cached: bool,
    pub stake_tx_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_ids: Option<Vec<JobId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage_truncated: Option<bool>,
}

impl DividendResponse {
    pub fn plain(data: DividendRecord, cached: bool) -> Self {
        Self {
            data,
            cached,
            stake_tx_triggered: false,
            task_ids: None,
            task_result: None,
            lineage_truncated: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: JobId,
    pub state: JobState,
    pub parent: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hotkey_is_treated_as_absent() {
        let params = TargetParams {
            netuid: Some(3),
            hotkey: Some(String::new()),
        };
        let query = params.query().unwrap();
        assert_eq!(query.netuid, Some(NetUid::new(3)));
        assert_eq!(query.hotkey, None);
    }

    #[test]
    fn timeout_defaults_and_bounds() {
        let default = Duration::from_secs(10);

        let params = DividendParams::default();
        assert_eq!(params.trigger_options(default).unwrap().timeout, default);

        let params = DividendParams {
            timeout: Some(5.0),
            wait: true,
            ..Default::default()
        };
        let options = params.trigger_options(default).unwrap();
        assert!(options.wait);
        assert_eq!(options.timeout, Duration::from_secs(5));

        for bad in [0.0, -1.0, 61.0, f64::NAN] {
            let params = DividendParams {
                timeout: Some(bad),
                ..Default::default()
            };
            assert!(params.trigger_options(default).is_err(), "accepted {bad}");
        }
    }
}
