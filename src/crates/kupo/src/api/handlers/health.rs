//! Health check endpoint handler
//!
//! Content negotiation on `Accept`: JSON by default, Prometheus exposition
//! text for `text/plain`, 415 for anything else.

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Handler for GET /health
pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("*/*");

    if accept.is_empty() || accept.contains("application/json") || accept.contains("*/*") {
        return Ok((StatusCode::OK, Json(state.health.report())).into_response());
    }
    if accept.contains("text/plain") {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            state.health.prometheus(),
        )
            .into_response());
    }
    Err(ApiError::UnsupportedContentType)
}
