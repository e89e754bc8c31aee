//! Blocks as delivered by the producer
//!
//! The producer hands the consumer fully-decoded blocks: per transaction, the
//! spent inputs, the produced outputs, and any inline datums, scripts, and
//! metadata the transaction carries. This is the only shape the indexing
//! fold ever sees, regardless of which transport produced it.

use crate::chain::address;
use crate::chain::pattern::Candidate;
use crate::chain::point::{Point, Slot};
use crate::chain::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputReference {
    /// Hex-encoded transaction id.
    pub transaction_id: String,
    /// Index of the output within the transaction.
    pub output_index: u64,
}

/// An output produced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Address text, bech32 or hex.
    pub address: String,
    /// Ada and assets locked by the output.
    pub value: Value,
    /// Hash of the datum attached to the output, if any.
    pub datum_hash: Option<String>,
    /// Hash of the reference script attached to the output, if any.
    pub script_hash: Option<String>,
}

/// A script carried by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Serialized script bytes.
    pub bytes: Vec<u8>,
    /// Language tag, e.g. `native` or `plutus:v2`.
    pub language: String,
}

/// A transaction within a block, reduced to what indexing needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex-encoded transaction id.
    pub id: String,
    /// Outputs this transaction spends.
    pub inputs: Vec<OutputReference>,
    /// Outputs this transaction produces, in order.
    pub outputs: Vec<TransactionOutput>,
    /// Datum preimages keyed by datum hash.
    pub datums: BTreeMap<String, Vec<u8>>,
    /// Scripts keyed by script hash.
    pub scripts: BTreeMap<String, Script>,
    /// Raw metadata bytes, if the transaction carries any.
    pub metadata: Option<Vec<u8>>,
}

/// A block as received from the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Slot the block was minted in.
    pub slot_no: Slot,
    /// Hex-encoded header hash.
    pub header_hash: String,
    /// Transactions in block order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The chain point of this block.
    pub fn point(&self) -> Point {
        Point::at(self.slot_no, self.header_hash.clone())
    }
}

impl Transaction {
    /// View one of this transaction's outputs as a match candidate.
    ///
    /// Credentials are extracted once per call; the consumer reuses them for
    /// the persisted row so extraction happens a single time per output.
    pub fn candidate<'a>(
        &'a self,
        output_index: u64,
        output: &'a TransactionOutput,
        credentials: &'a address::Credentials,
    ) -> Candidate<'a> {
        Candidate {
            address: &output.address,
            payment_credential: credentials.payment.as_deref(),
            delegation_credential: credentials.delegation.as_deref(),
            value: &output.value,
            transaction_id: &self.id,
            output_index,
        }
    }
}
