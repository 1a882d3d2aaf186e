use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use taodiv_core::JobId;
use taodiv_infra::jobs::{JobState, QueueError};

use crate::app::dto::TaskStatusResponse;
use crate::app::errors;
use crate::app::services::AppServices;

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid task id"),
    };

    let state = match services.queue.state(id).await {
        Ok(state) => state,
        Err(QueueError::NotFound(_)) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "task not found");
        }
        Err(e) => {
            tracing::error!(task_id = %id, error = %e, "task state lookup failed");
            return errors::json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "queue_unavailable",
                "task state is unavailable",
            );
        }
    };

    // A finished job answers immediately; a zero wait never blocks.
    let result = if state == JobState::Succeeded {
        services
            .queue
            .wait_result(id, Duration::ZERO)
            .await
            .ok()
            .flatten()
    } else {
        None
    };

    Json(TaskStatusResponse {
        task_id: id,
        state,
        parent: services.queue.parent_of(id),
        result,
    })
    .into_response()
}
