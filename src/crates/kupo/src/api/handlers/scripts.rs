//! Script endpoint handler

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::ScriptResponse;
use crate::api::routes::AppState;
use crate::db::repositories::ScriptRepository;
use axum::extract::{Path, State};
use axum::Json;

const SCRIPT_HASH_HEX_LEN: usize = 56;

/// Handler for GET /scripts/{hash}
///
/// Returns `null` (not 404) for unknown hashes.
pub async fn get_script(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<Option<ScriptResponse>>> {
    if hash.len() != SCRIPT_HASH_HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::MalformedScriptHash);
    }
    let mut tx = state.db.begin_read().await?;
    let script = ScriptRepository::get(tx.conn(), &hash.to_lowercase()).await?;
    tx.commit().await?;
    Ok(Json(script.map(ScriptResponse::from)))
}
