//! Standard layers for the feed API.

use std::time::Duration;

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{HttpMakeClassifier, TraceLayer};

/// Request/response spans through `tracing`.
pub fn trace_layer() -> TraceLayer<HttpMakeClassifier> {
    TraceLayer::new_for_http()
}

/// The feed is read by browser clients served from other origins.
pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}
