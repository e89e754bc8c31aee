//! Request tracer
//!
//! Records `{method, path, status}` for every request, under the
//! `kupo::api` target so that `--log-level-http` governs it. The method and
//! path open the request span; the status and latency are recorded inside
//! it once the response is ready.

use axum::body::Body;
use axum::http::{Request, Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, TraceLayer};
use tracing::Span;

type MakeSpanFn = fn(&Request<Body>) -> Span;
type OnResponseFn = fn(&Response<Body>, Duration, &Span);

/// Tracing layer for the HTTP surface.
pub fn tracer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeSpanFn, DefaultOnRequest, OnResponseFn>
{
    TraceLayer::new_for_http()
        .make_span_with(request_span as MakeSpanFn)
        .on_response(record_status as OnResponseFn)
}

fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        target: "kupo::api",
        "request",
        method = %request.method(),
        path = %request.uri().path()
    )
}

fn record_status(response: &Response<Body>, elapsed: Duration, span: &Span) {
    let _guard = span.enter();
    tracing::info!(
        target: "kupo::api",
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "request handled"
    );
}
