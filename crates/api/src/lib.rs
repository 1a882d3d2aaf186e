//! HTTP API: routing, API-key guard, and response mapping.

pub mod app;
pub mod middleware;
