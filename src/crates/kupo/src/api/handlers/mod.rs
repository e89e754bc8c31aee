//! API request handlers
//!
//! Handler functions for all endpoints, organized by resource.

pub mod checkpoints;
pub mod datums;
pub mod health;
pub mod matches;
pub mod metadata;
pub mod patterns;
pub mod scripts;

pub use checkpoints::{get_checkpoint, list_checkpoints};
pub use datums::get_datum;
pub use health::health;
pub use matches::{
    delete_matches_one, delete_matches_two, list_matches, list_matches_one, list_matches_two,
};
pub use metadata::get_metadata;
pub use patterns::{
    delete_pattern_one, delete_pattern_two, get_patterns_one, get_patterns_two, list_patterns,
    put_pattern_one, put_pattern_two,
};
pub use scripts::get_script;

use crate::api::error::ApiError;

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
