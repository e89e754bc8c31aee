//! Pattern endpoint handlers
//!
//! Reads list the registry; `PUT` drives a forced rollback through the
//! consumer so the new pattern back-fills from `since`, and `DELETE` removes
//! the pattern while leaving its data for garbage collection (or an explicit
//! `DELETE /matches`).

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{resolve_since, Deleted, PutPatternBody, SinceTarget};
use crate::api::routes::AppState;
use crate::chain::Pattern;
use crate::consumer::{ForcedRollback, ForcedRollbackError, RollbackLimit};
use crate::db::repositories::{CheckpointRepository, PatternRepository};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tokio::sync::oneshot;

/// Handler for GET /patterns
pub async fn list_patterns(State(state): State<AppState>) -> Json<Vec<Pattern>> {
    Json(state.registry.snapshot())
}

/// Handler for GET /patterns/{pattern}
pub async fn get_patterns_one(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> ApiResult<Json<Vec<Pattern>>> {
    included_patterns(state, pattern)
}

/// Handler for GET /patterns/{pattern}/{sub}
pub async fn get_patterns_two(
    State(state): State<AppState>,
    Path((pattern, sub)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Pattern>>> {
    included_patterns(state, format!("{}/{}", pattern, sub))
}

/// Handler for PUT /patterns/{pattern}
pub async fn put_pattern_one(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
    body: Result<Json<PutPatternBody>, JsonRejection>,
) -> ApiResult<Json<Vec<Pattern>>> {
    put_pattern(state, pattern, body).await
}

/// Handler for PUT /patterns/{pattern}/{sub}
pub async fn put_pattern_two(
    State(state): State<AppState>,
    Path((pattern, sub)): Path<(String, String)>,
    body: Result<Json<PutPatternBody>, JsonRejection>,
) -> ApiResult<Json<Vec<Pattern>>> {
    put_pattern(state, format!("{}/{}", pattern, sub), body).await
}

/// Handler for DELETE /patterns/{pattern}
pub async fn delete_pattern_one(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> ApiResult<Json<Deleted>> {
    delete_pattern(state, pattern).await
}

/// Handler for DELETE /patterns/{pattern}/{sub}
pub async fn delete_pattern_two(
    State(state): State<AppState>,
    Path((pattern, sub)): Path<(String, String)>,
) -> ApiResult<Json<Deleted>> {
    delete_pattern(state, format!("{}/{}", pattern, sub)).await
}

fn included_patterns(state: AppState, pattern_text: String) -> ApiResult<Json<Vec<Pattern>>> {
    let pattern: Pattern = pattern_text.parse().map_err(|_| ApiError::InvalidPattern)?;
    Ok(Json(state.registry.included_by(&pattern)))
}

async fn put_pattern(
    state: AppState,
    pattern_text: String,
    body: Result<Json<PutPatternBody>, JsonRejection>,
) -> ApiResult<Json<Vec<Pattern>>> {
    let pattern: Pattern = pattern_text.parse().map_err(|_| ApiError::InvalidPattern)?;
    let Json(body) =
        body.map_err(|e| ApiError::InvalidMatchFilter(format!("malformed request body: {}", e)))?;

    let point = match resolve_since(&body.since)? {
        SinceTarget::Point(point) => point,
        SinceTarget::Slot(slot_no) => {
            let mut tx = state.db.begin_read().await?;
            let ancestor = CheckpointRepository::closest_ancestor(tx.conn(), slot_no).await?;
            tx.commit().await?;
            ancestor
                .map(|checkpoint| checkpoint.point())
                .ok_or(ApiError::NonExistingPoint)?
        }
    };

    let limit = match body.limit.as_deref() {
        None | Some("within_safe_zone") => RollbackLimit::WithinSafeZone,
        Some("any") => RollbackLimit::Any,
        Some(other) => {
            return Err(ApiError::InvalidMatchFilter(format!(
                "unknown limit '{}'",
                other
            )))
        }
    };

    // Early refusal against the current tip; the consumer re-checks under
    // its own lock before acting.
    let tip_slot = state
        .health
        .most_recent_checkpoint()
        .and_then(|p| p.slot_no())
        .unwrap_or(0);
    if limit == RollbackLimit::WithinSafeZone
        && tip_slot.saturating_sub(point.slot_or_zero()) > state.longest_rollback
    {
        return Err(ApiError::UnsafeRollbackBeyondSafeZone);
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .rollback_tx
        .send(ForcedRollback {
            point,
            limit,
            pattern: Some(pattern),
            reply: reply_tx,
        })
        .await
        .map_err(|_| ApiError::FailedToRollback("the chain consumer is not running".into()))?;

    match reply_rx.await {
        Ok(Ok(_)) => Ok(Json(state.registry.snapshot())),
        Ok(Err(ForcedRollbackError::BeyondSafeZone)) => Err(ApiError::UnsafeRollbackBeyondSafeZone),
        Ok(Err(ForcedRollbackError::Failed(message))) => Err(ApiError::FailedToRollback(message)),
        Err(_) => Err(ApiError::FailedToRollback(
            "the chain consumer dropped the request".into(),
        )),
    }
}

async fn delete_pattern(state: AppState, pattern_text: String) -> ApiResult<Json<Deleted>> {
    let pattern: Pattern = pattern_text.parse().map_err(|_| ApiError::InvalidPattern)?;
    let mut tx = state.db.begin_write().await?;
    let deleted_row = PatternRepository::delete(tx.conn(), &pattern).await?;
    tx.commit().await?;
    let deleted_live = state.registry.remove(&pattern);
    Ok(Json(Deleted {
        deleted: u64::from(deleted_row || deleted_live),
    }))
}
