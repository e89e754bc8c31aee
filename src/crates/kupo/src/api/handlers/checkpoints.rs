//! Checkpoint endpoint handlers

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::PointParts;
use crate::api::response::json_lines;
use crate::api::routes::AppState;
use crate::db::repositories::CheckpointRepository;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;

/// Handler for GET /checkpoints
///
/// Streams all stored checkpoints, most recent first.
pub async fn list_checkpoints(State(state): State<AppState>) -> ApiResult<Response> {
    let mut tx = state.db.begin_read().await?;
    let checkpoints = CheckpointRepository::list_desc(tx.conn()).await?;
    tx.commit().await?;

    let (lines, response) = json_lines();
    tokio::spawn(async move {
        for checkpoint in &checkpoints {
            if !lines.send(&PointParts::from(checkpoint)).await {
                break;
            }
        }
    });
    Ok(response)
}

/// Handler for GET /checkpoints/{slot}
///
/// Strict mode returns the checkpoint exactly at the slot; otherwise the
/// closest ancestor. `null` when there is none.
pub async fn get_checkpoint(
    State(state): State<AppState>,
    Path(slot): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Option<PointParts>>> {
    let slot_no: u64 = slot.parse().map_err(|_| ApiError::InvalidSlotNo)?;

    let mut strict = false;
    for (key, value) in &params {
        match (key.as_str(), value.as_str()) {
            ("strict", "true") => strict = true,
            ("strict", "false") => strict = false,
            ("strict", _) => {
                return Err(ApiError::InvalidMatchFilter(
                    "strict must be 'true' or 'false'".into(),
                ))
            }
            (other, _) => {
                return Err(ApiError::InvalidMatchFilter(format!(
                    "unknown query parameter '{}'",
                    other
                )))
            }
        }
    }

    let mut tx = state.db.begin_read().await?;
    let checkpoint = if strict {
        CheckpointRepository::at_slot(tx.conn(), slot_no).await?
    } else {
        CheckpointRepository::closest_ancestor(tx.conn(), slot_no).await?
    };
    tx.commit().await?;

    Ok(Json(checkpoint.as_ref().map(PointParts::from)))
}
