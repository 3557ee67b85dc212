//! # Feed API
//!
//! axum router over `FeedEngine`. Public reads live under `/api/feed`,
//! operational triggers under `/api/admin`.
//!
//! # Developer Note
//! The admin routes carry no authentication of their own; they are meant to be
//! reachable only from inside the deployment network.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::routing::{delete, get, post, put};
use axum::Router;

pub use handlers::AppState;
pub use metrics::Metrics;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/feed", get(handlers::get_feed))
        .route("/feed/top", get(handlers::get_top))
        .route("/admin/ranking/rebuild", post(handlers::rebuild_ranking))
        .route(
            "/admin/ranking/posts/{id}",
            put(handlers::update_post_score).delete(handlers::remove_post),
        )
        .route(
            "/admin/events/{id}/status-changed",
            post(handlers::event_status_changed),
        )
        .route("/admin/top-cache/refresh", post(handlers::refresh_top_cache))
        .route(
            "/admin/top-cache",
            delete(handlers::invalidate_top_cache),
        );

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::cors_policy())
        .layer(middleware::trace_layer())
        .with_state(state)
}
