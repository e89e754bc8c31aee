//! Datum endpoint handler

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::Datum;
use crate::api::routes::AppState;
use crate::db::repositories::BinaryDataRepository;
use axum::extract::{Path, State};
use axum::Json;

const DATUM_HASH_HEX_LEN: usize = 64;

/// Handler for GET /datums/{hash}
///
/// Returns `null` (not 404) for unknown hashes.
pub async fn get_datum(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<Option<Datum>>> {
    if hash.len() != DATUM_HASH_HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::MalformedDatumHash);
    }
    let mut tx = state.db.begin_read().await?;
    let datum = BinaryDataRepository::get(tx.conn(), &hash.to_lowercase()).await?;
    tx.commit().await?;
    Ok(Json(datum.map(Datum::from)))
}
