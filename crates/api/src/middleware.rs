use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors::json_error;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct ApiKeyState {
    pub api_key: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Missing,
    Invalid,
}

impl Rejection {
    fn message(&self) -> &'static str {
        match self {
            Rejection::Missing => "API Key header is missing",
            Rejection::Invalid => "Invalid API Key",
        }
    }
}

pub async fn api_key_middleware(
    State(state): State<ApiKeyState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    check_api_key(req.headers(), &state.api_key).map_err(|rejection| {
        tracing::debug!(reason = rejection.message(), path = %req.uri().path(), "request rejected");
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", rejection.message())
    })?;

    Ok(next.run(req).await)
}

fn check_api_key(headers: &HeaderMap, expected: &str) -> Result<(), Rejection> {
    let header = headers.get(API_KEY_HEADER).ok_or(Rejection::Missing)?;
    let provided = header.to_str().map_err(|_| Rejection::Invalid)?;

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(Rejection::Invalid);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
