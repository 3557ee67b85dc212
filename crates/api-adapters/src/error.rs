//! Maps engine errors onto HTTP responses. Store internals never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::error::AppError;
use serde_json::json;
use tracing::{error, warn};

pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            AppError::ValidationError(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            err @ AppError::NotFound(..) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": err.to_string() }))).into_response()
            }
            AppError::Unavailable(detail) => {
                warn!(%detail, "request failed: feed unavailable");
                unavailable()
            }
            AppError::Internal(detail) => {
                error!(%detail, "request failed: internal error");
                unavailable()
            }
        }
    }
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "feed unavailable" })),
    )
        .into_response()
}
