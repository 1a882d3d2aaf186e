use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::IntoResponse,
};

use taodiv_infra::PurgeScope;

use crate::app::dto::{PurgeResponse, TargetParams};
use crate::app::errors;
use crate::app::services::AppServices;

pub async fn purge_cache(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<TargetParams>,
) -> axum::response::Response {
    let query = match params.query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    let message = match services.gateway.purge(&query).await {
        Ok(PurgeScope::All { removed }) => {
            format!("All cache entries purged successfully ({removed} removed)")
        }
        Ok(PurgeScope::Single { .. }) => {
            let netuid = query.netuid.map(|n| n.to_string());
            let hotkey = query.hotkey.as_ref().map(|h| h.to_string());
            format!(
                "Cache purged for netuid={}, hotkey={}",
                netuid.as_deref().unwrap_or("all"),
                hotkey.as_deref().unwrap_or("all"),
            )
        }
        Err(e) => return errors::gateway_error_to_response(&e),
    };

    Json(PurgeResponse {
        success: true,
        message,
    })
    .into_response()
}
