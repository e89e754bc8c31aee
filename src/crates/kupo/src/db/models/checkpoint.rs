//! Checkpoint model for database persistence

use crate::chain::Point;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents a persisted resume/rollback anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Checkpoint {
    /// Absolute slot of the checkpointed block
    pub slot_no: i64,

    /// Hex-encoded header hash of the checkpointed block
    pub header_hash: String,
}

impl Checkpoint {
    /// The chain point this checkpoint anchors.
    pub fn point(&self) -> Point {
        Point::at(self.slot_no as u64, self.header_hash.clone())
    }
}
