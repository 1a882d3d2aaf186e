use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::IntoResponse,
};

use taodiv_infra::ChainProgress;

use crate::app::dto::{DividendParams, DividendResponse, TargetParams};
use crate::app::errors;
use crate::app::services::AppServices;

/// Cache-first lookup, optionally triggering the sentiment → stake chain.
pub async fn get_dividends(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<DividendParams>,
) -> axum::response::Response {
    let query = match params.query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let options = match params.trigger_options(services.settings.default_wait_timeout) {
        Ok(o) => o,
        Err(resp) => return resp,
    };

    let resolved = match services.gateway.resolve(&query).await {
        Ok(r) => r,
        Err(e) => return errors::gateway_error_to_response(&e),
    };

    if !params.trade {
        return Json(DividendResponse::plain(resolved.record, resolved.cached)).into_response();
    }

    let target = query.resolve(&services.settings);
    let report = match services.orchestrator.trigger(&target, options).await {
        Ok(report) => report,
        Err(failure) => return errors::chain_failure_response(&resolved.record, &failure),
    };

    let task_result = match report.progress {
        ChainProgress::StillRunning(_) => {
            return errors::chain_pending_response(&resolved.record, &report.task_ids);
        }
        ChainProgress::Submitted => None,
        ChainProgress::Completed(value) => Some(value),
    };

    Json(DividendResponse {
        data: resolved.record,
        cached: resolved.cached,
        stake_tx_triggered: true,
        task_ids: Some(report.task_ids),
        task_result,
        lineage_truncated: Some(report.lineage_truncated),
    })
    .into_response()
}

/// Fresh query; the cache is neither read nor written.
pub async fn get_dividends_no_cache(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<TargetParams>,
) -> axum::response::Response {
    let query = match params.query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.gateway.fetch_fresh(&query).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::gateway_error_to_response(&e),
    }
}
