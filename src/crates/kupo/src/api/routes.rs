//! API route definitions
//!
//! One stateless router keyed on method and path. Unmatched routes become
//! 404s with the documented body; wrong methods become 405s via middleware.

use crate::api::{handlers, middleware};
use crate::consumer::{BlockFetcher, ForcedRollbackSender};
use crate::db::Database;
use crate::health::Health;
use crate::registry::PatternRegistry;
use axum::{
    routing::get,
    Router,
};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub registry: PatternRegistry,
    pub health: Health,
    pub rollback_tx: ForcedRollbackSender,
    pub fetcher: Arc<dyn BlockFetcher>,
    pub longest_rollback: u64,
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/checkpoints", get(handlers::list_checkpoints))
        .route("/checkpoints/:slot", get(handlers::get_checkpoint))
        .route("/matches", get(handlers::list_matches))
        .route(
            "/matches/:pattern",
            get(handlers::list_matches_one).delete(handlers::delete_matches_one),
        )
        .route(
            "/matches/:pattern/:sub",
            get(handlers::list_matches_two).delete(handlers::delete_matches_two),
        )
        .route("/datums/:hash", get(handlers::get_datum))
        .route("/scripts/:hash", get(handlers::get_script))
        .route("/metadata/:slot", get(handlers::get_metadata))
        .route("/patterns", get(handlers::list_patterns))
        .route(
            "/patterns/:pattern",
            get(handlers::get_patterns_one)
                .put(handlers::put_pattern_one)
                .delete(handlers::delete_pattern_one),
        )
        .route(
            "/patterns/:pattern/:sub",
            get(handlers::get_patterns_two)
                .put(handlers::put_pattern_two)
                .delete(handlers::delete_pattern_two),
        )
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(middleware::method_not_allowed))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::checkpoint_header,
        ))
        .layer(middleware::tracer())
        .with_state(state)
}
