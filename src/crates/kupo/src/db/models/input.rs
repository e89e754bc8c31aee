//! Input model for database persistence
//!
//! An "input" is a materialized transaction output: created when the
//! consumer persists a block, mutated once when spent, and destroyed either
//! by a rollback or by the garbage collector.

use crate::chain::address::Credentials;
use crate::chain::{Point, TransactionOutput};
use sqlx::FromRow;

/// Represents a materialized output in the database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Input {
    /// Hex-encoded id of the transaction that produced the output
    pub transaction_id: String,

    /// Index of the output within the producing transaction
    pub output_index: i64,

    /// Address text, bech32 or hex
    pub address: String,

    /// Hex-encoded payment credential extracted from the address
    pub payment_credential: Option<String>,

    /// Hex-encoded delegation credential extracted from the address
    pub delegation_credential: Option<String>,

    /// CBOR-encoded Ada+assets value
    pub value: Vec<u8>,

    /// Hash of the attached datum, if any
    pub datum_hash: Option<String>,

    /// Hash of the attached reference script, if any
    pub script_hash: Option<String>,

    /// Slot of the block that created the output
    pub created_at_slot: i64,

    /// Header hash of the block that created the output
    pub created_at_header_hash: String,

    /// Slot of the block that spent the output, if spent
    pub spent_at_slot: Option<i64>,

    /// Header hash of the block that spent the output, if spent
    pub spent_at_header_hash: Option<String>,

    /// Id of the transaction that spent the output, if spent
    pub spent_at_transaction_id: Option<String>,
}

impl Input {
    /// Build a fresh (unspent) input from a matched output.
    pub fn from_output(
        transaction_id: &str,
        output_index: u64,
        output: &TransactionOutput,
        credentials: &Credentials,
        value: Vec<u8>,
        created_at: &Point,
    ) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            output_index: output_index as i64,
            address: output.address.clone(),
            payment_credential: credentials.payment.clone(),
            delegation_credential: credentials.delegation.clone(),
            value,
            datum_hash: output.datum_hash.clone(),
            script_hash: output.script_hash.clone(),
            created_at_slot: created_at.slot_or_zero() as i64,
            created_at_header_hash: created_at.header_hash().unwrap_or_default().to_string(),
            spent_at_slot: None,
            spent_at_header_hash: None,
            spent_at_transaction_id: None,
        }
    }

    /// The point at which this input was created.
    pub fn created_at(&self) -> Point {
        Point::at(self.created_at_slot as u64, self.created_at_header_hash.clone())
    }
}
