use axum::{
    Router,
    routing::{get, post},
};

pub mod cache;
pub mod dividends;
pub mod system;
pub mod tasks;

/// Router for all API-key protected endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/tao_dividends", get(dividends::get_dividends))
        .route("/tao_dividends_cached", get(dividends::get_dividends))
        .route("/tao_dividends_no_cache", get(dividends::get_dividends_no_cache))
        .route("/purge_cache", post(cache::purge_cache))
        .route("/tasks/:id", get(tasks::get_task))
}
