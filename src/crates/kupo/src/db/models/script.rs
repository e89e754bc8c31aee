//! Script model for database persistence

use sqlx::FromRow;

/// A script, keyed by its hash.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ScriptRow {
    /// Hex-encoded hash of the script
    pub script_hash: String,

    /// Serialized script bytes
    pub script: Vec<u8>,

    /// Language tag, e.g. `native` or `plutus:v2`
    pub language: String,
}
