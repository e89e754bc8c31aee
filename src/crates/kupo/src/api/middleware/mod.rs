//! API middleware layer
//!
//! Request tracing, the most-recent-checkpoint response header, and the
//! rewrite of axum's bare 405s into the documented error body.

pub mod logging;

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub use logging::tracer;

/// Name of the checkpoint header attached to every response.
pub const MOST_RECENT_CHECKPOINT_HEADER: &str = "X-Most-Recent-Checkpoint";

/// Stamp the most recent checkpoint slot onto every response.
pub async fn checkpoint_header(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if let Some(slot_no) = state
        .health
        .most_recent_checkpoint()
        .and_then(|point| point.slot_no())
    {
        if let Ok(value) = HeaderValue::from_str(&slot_no.to_string()) {
            response
                .headers_mut()
                .insert(MOST_RECENT_CHECKPOINT_HEADER, value);
        }
    }
    response
}

/// Replace the router's empty 405 responses with the documented error body.
pub async fn method_not_allowed(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        return ApiError::MethodNotAllowed.into_response();
    }
    response
}
