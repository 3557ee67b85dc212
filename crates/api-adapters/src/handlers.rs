//! # Feed API Handlers
//!
//! Thin adapters between HTTP and `FeedEngine`. Viewer identity comes from the
//! `Authorization` header and is always optional.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::models::{AuthContext, EventId, Page, PostId, ScoredPost, UserId};
use domains::traits::ViewerResolver;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::{CacheStatus, FeedEngine, FeedSource, RebuildReport};
use tracing::{error, info};

use crate::error::ApiError;
use crate::metrics::Metrics;

const DEFAULT_PAGE_SIZE: u32 = 20;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FeedEngine>,
    pub resolver: Arc<dyn ViewerResolver>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    #[serde(flatten)]
    pub page: Page<ScoredPost>,
    pub source: FeedSource,
}

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub posts: Vec<ScoredPost>,
    pub cache: CacheStatus,
}

fn viewer(state: &AppState, headers: &HeaderMap) -> Option<UserId> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    state
        .resolver
        .resolve_viewer_id(&AuthContext::from_authorization_header(header))
}

impl AppState {
    fn top_limit(&self, query: &LimitQuery) -> u32 {
        query
            .limit
            .unwrap_or(self.engine.options().top_limit)
    }
}

/// `GET /api/feed`
pub async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, ApiError> {
    let viewer = viewer(&state, &headers);
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE);

    let feed = state.engine.get_visible_posts(viewer, page, size).await?;
    state.metrics.feed_served(feed.source, viewer.is_some());
    Ok(Json(FeedResponse {
        page: feed.page,
        source: feed.source,
    }))
}

/// `GET /api/feed/top`
pub async fn get_top(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<TopResponse>, ApiError> {
    let top = state
        .engine
        .get_top_posts_cached(state.top_limit(&query))
        .await?;
    state.metrics.top_lookup(top.cache);
    Ok(Json(TopResponse {
        posts: top.posts,
        cache: top.cache,
    }))
}

/// `POST /api/admin/ranking/rebuild`
pub async fn rebuild_ranking(State(state): State<AppState>) -> Result<Json<RebuildReport>, ApiError> {
    let result = state.engine.rebuild_ranking_from_source().await;
    state.metrics.rebuild(result.is_ok());
    Ok(Json(result?))
}

/// `PUT /api/admin/ranking/posts/{id}`
pub async fn update_post_score(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let score = state.engine.update_post_score(post_id).await?;
    Ok(Json(json!({ "post_id": post_id, "score": score })))
}

/// `DELETE /api/admin/ranking/posts/{id}`
pub async fn remove_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
) -> Json<serde_json::Value> {
    let index_updated = state.engine.remove_post(post_id).await;
    Json(json!({ "post_id": post_id, "index_updated": index_updated }))
}

/// `POST /api/admin/events/{id}/status-changed`
pub async fn event_status_changed(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<RebuildReport>, ApiError> {
    let result = state.engine.on_event_status_changed(event_id).await;
    state.metrics.rebuild(result.is_ok());
    Ok(Json(result?))
}

/// `POST /api/admin/top-cache/refresh`
pub async fn refresh_top_cache(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = state.top_limit(&query);
    let posts = state.engine.refresh_top_posts_cache(limit).await?;
    info!(limit, posts = posts.len(), "top posts snapshot refreshed on demand");
    Ok(Json(json!({ "limit": limit, "posts": posts.len() })))
}

/// `DELETE /api/admin/top-cache`
pub async fn invalidate_top_cache(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<serde_json::Value> {
    let limit = state.top_limit(&query);
    let invalidated = state.engine.invalidate_top_posts_cache(limit).await;
    Json(json!({ "limit": limit, "invalidated": invalidated }))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(
                CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "cannot encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
