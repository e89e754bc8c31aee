//! API response and request models
//!
//! Wire shapes for the read endpoints. Binary artifacts are hex-encoded;
//! values are decoded from their storage CBOR back into structured JSON.

use crate::api::error::ApiError;
use crate::chain::{Point, Value};
use crate::db::models::{BinaryData, Checkpoint, Input, ScriptRow};
use serde::{Deserialize, Serialize};

/// One element of a `/matches` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub transaction_id: String,
    pub output_index: u64,
    pub address: String,
    pub value: Value,
    pub datum_hash: Option<String>,
    pub script_hash: Option<String>,
    pub created_at: PointParts,
    pub spent_at: Option<SpentAt>,
}

/// A point split into its slot and hash parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointParts {
    pub slot_no: u64,
    pub header_hash: String,
}

/// Where and by what an input was spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpentAt {
    pub slot_no: u64,
    pub header_hash: String,
    pub transaction_id: String,
}

impl TryFrom<Input> for Match {
    type Error = ApiError;

    fn try_from(input: Input) -> Result<Self, Self::Error> {
        let value = Value::from_cbor(&input.value)
            .map_err(|e| ApiError::Internal(format!("stored value is undecodable: {}", e)))?;
        let spent_at = match (
            input.spent_at_slot,
            input.spent_at_header_hash,
            input.spent_at_transaction_id,
        ) {
            (Some(slot_no), Some(header_hash), Some(transaction_id)) => Some(SpentAt {
                slot_no: slot_no as u64,
                header_hash,
                transaction_id,
            }),
            _ => None,
        };
        Ok(Match {
            transaction_id: input.transaction_id,
            output_index: input.output_index as u64,
            address: input.address,
            value,
            datum_hash: input.datum_hash,
            script_hash: input.script_hash,
            created_at: PointParts {
                slot_no: input.created_at_slot as u64,
                header_hash: input.created_at_header_hash,
            },
            spent_at,
        })
    }
}

impl From<&Checkpoint> for PointParts {
    fn from(checkpoint: &Checkpoint) -> Self {
        PointParts {
            slot_no: checkpoint.slot_no as u64,
            header_hash: checkpoint.header_hash.clone(),
        }
    }
}

/// Body of `GET /datums/{hash}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datum {
    /// Hex-encoded CBOR of the datum.
    pub datum: String,
}

impl From<BinaryData> for Datum {
    fn from(row: BinaryData) -> Self {
        Datum {
            datum: hex::encode(row.data),
        }
    }
}

/// Body of `GET /scripts/{hash}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub language: String,
    /// Hex-encoded script bytes.
    pub script: String,
}

impl From<ScriptRow> for ScriptResponse {
    fn from(row: ScriptRow) -> Self {
        ScriptResponse {
            language: row.language,
            script: hex::encode(row.script),
        }
    }
}

/// One element of a `/metadata/{slot}` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub transaction_id: String,
    /// Hex-encoded CBOR of the metadata.
    pub raw: String,
}

/// Body of `PUT /patterns/{pattern}`.
///
/// `since` is either a point (`"origin"` or `"<slot>.<hash>"`) or a bare
/// slot number, resolved through the closest-ancestor checkpoint. A point
/// inside the safe zone that was never checkpointed is accepted
/// optimistically: the rollback trusts the client and anchors a synthetic
/// checkpoint there.
#[derive(Debug, Clone, Deserialize)]
pub struct PutPatternBody {
    pub since: serde_json::Value,
    #[serde(default)]
    pub limit: Option<String>,
}

/// Body of the deletion endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: u64,
}

/// Split a resolved `since` out of a request body.
pub fn resolve_since(since: &serde_json::Value) -> Result<SinceTarget, ApiError> {
    match since {
        serde_json::Value::String(text) => {
            let point: Point = text.parse().map_err(|_| ApiError::MalformedPoint)?;
            Ok(SinceTarget::Point(point))
        }
        serde_json::Value::Number(number) => number
            .as_u64()
            .map(SinceTarget::Slot)
            .ok_or(ApiError::MalformedPoint),
        _ => Err(ApiError::MalformedPoint),
    }
}

/// A `since` before checkpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinceTarget {
    Point(Point),
    Slot(u64),
}
