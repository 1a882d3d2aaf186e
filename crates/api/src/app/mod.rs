//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: collaborator wiring (cache, source, queue, orchestrator)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: query parameters and response bodies
//! - `errors.rs`: category → status mapping and error bodies

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use taodiv_core::Settings;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, ServicesError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(settings: Settings) -> Result<Router, ServicesError> {
    let services = services::build_services(Arc::new(settings))?;
    Ok(build_router(Arc::new(services)))
}

/// Router over already-built services.
pub fn build_router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::ApiKeyState {
        api_key: Arc::from(services.settings.api_key.as_str()),
    };

    // Protected routes: require a valid X-API-Key.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::api_key_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", protected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let settings = Settings {
            api_key: "test-key".into(),
            ..Settings::default()
        };
        build_app(settings).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(middleware::API_KEY_HEADER, "test-key")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn missing_key_is_rejected_with_reason() {
        let req = Request::get("/api/v1/tao_dividends").body(Body::empty()).unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "API Key header is missing");
    }

    #[tokio::test]
    async fn invalid_hotkey_is_a_bad_request() {
        let (status, body) = send(app(), get("/api/v1/tao_dividends?hotkey=a:b")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_hotkey");
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let uri = format!("/api/v1/tasks/{}", taodiv_core::JobId::new());
        let (status, _) = send(app(), get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fresh_lookup_returns_the_record() {
        let (status, body) = send(app(), get("/api/v1/tao_dividends_no_cache?netuid=7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["netuid"], 7);
        assert_eq!(body["dividend"], 12_345_678);
    }
}
