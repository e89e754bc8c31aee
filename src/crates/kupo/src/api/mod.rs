//! HTTP request surface
//!
//! Stateless router over the storage engine and the pattern registry,
//! plus the forced-rollback channel into the consumer. Read handlers open
//! short-lived deferred transactions and stream newline-delimited JSON;
//! mutations open short-lived immediate transactions.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::{create_router, AppState};
