use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use taodiv_core::{DividendRecord, JobId};
use taodiv_infra::{ChainFailure, ErrorCategory, GatewayError};

pub fn category_status(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::TaskCreation | ErrorCategory::TaskChaining | ErrorCategory::UnknownError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ErrorCategory::UpstreamError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::TaskRevoked => StatusCode::CONFLICT,
        ErrorCategory::TimeoutError => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// Failed background processing; the already resolved dividend data still goes out.
pub fn chain_failure_response(
    data: &DividendRecord,
    failure: &ChainFailure,
) -> axum::response::Response {
    (
        category_status(failure.category),
        axum::Json(json!({
            "dividend_data": data,
            "stake_tx_triggered": false,
            "stake_error": failure.category.code(),
            "error_details": failure.details,
            "task_ids": failure.task_ids,
        })),
    )
        .into_response()
}

/// The wait ran out while the chain keeps running; nothing was revoked.
pub fn chain_pending_response(
    data: &DividendRecord,
    task_ids: &[JobId],
) -> axum::response::Response {
    (
        StatusCode::GATEWAY_TIMEOUT,
        axum::Json(json!({
            "dividend_data": data,
            "stake_tx_triggered": true,
            "stake_error": ErrorCategory::TimeoutError.code(),
            "error_details": "Background task is still running; poll the task ids for its outcome",
            "task_ids": task_ids,
        })),
    )
        .into_response()
}

pub fn gateway_error_to_response(err: &GatewayError) -> axum::response::Response {
    tracing::error!(error = %err, "dividend request failed");
    match err {
        GatewayError::Upstream(_) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::UpstreamError.code(),
            ErrorCategory::UpstreamError.message(),
        ),
        GatewayError::Purge(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "purge_failed",
            "Failed to purge cache",
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
