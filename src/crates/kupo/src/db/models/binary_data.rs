//! Binary data (datum) model for database persistence

use sqlx::FromRow;

/// A datum preimage, reference-counted by the inputs mentioning its hash.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BinaryData {
    /// Hex-encoded hash of the datum
    pub datum_hash: String,

    /// Raw CBOR bytes of the datum
    pub data: Vec<u8>,
}
