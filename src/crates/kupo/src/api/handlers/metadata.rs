//! Metadata endpoint handler
//!
//! Metadata is not indexed; it is fetched on demand from the producer for
//! the block anchored at the slot's closest ancestor checkpoint.

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::TransactionMetadata;
use crate::api::response::json_lines;
use crate::api::routes::AppState;
use crate::db::repositories::CheckpointRepository;
use axum::extract::{Path, State};
use axum::http::HeaderValue;
use axum::response::Response;

/// Name of the header carrying the fetched block's hash.
pub const BLOCK_HEADER_HASH_HEADER: &str = "X-Block-Header-Hash";

/// Handler for GET /metadata/{slot}
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(slot): Path<String>,
) -> ApiResult<Response> {
    let slot_no: u64 = slot.parse().map_err(|_| ApiError::InvalidSlotNo)?;

    let mut tx = state.db.begin_read().await?;
    let ancestor = CheckpointRepository::closest_ancestor(tx.conn(), slot_no).await?;
    tx.commit().await?;
    let ancestor = ancestor.ok_or(ApiError::NoAncestor)?;

    let block = state
        .fetcher
        .fetch_block(&ancestor.point())
        .await
        .map_err(|e| ApiError::Internal(format!("block fetch failed: {}", e)))?;

    let (lines, mut response) = json_lines();
    let header_hash = block
        .as_ref()
        .map(|b| b.header_hash.clone())
        .unwrap_or_else(|| ancestor.header_hash.clone());
    if let Ok(value) = HeaderValue::from_str(&header_hash) {
        response.headers_mut().insert(BLOCK_HEADER_HASH_HEADER, value);
    }

    tokio::spawn(async move {
        let Some(block) = block else { return };
        for transaction in &block.transactions {
            let Some(metadata) = &transaction.metadata else {
                continue;
            };
            let document = TransactionMetadata {
                transaction_id: transaction.id.clone(),
                raw: hex::encode(metadata),
            };
            if !lines.send(&document).await {
                break;
            }
        }
    });

    Ok(response)
}
