//! Binary data (datum) repository for database operations

use crate::db::error::DbResult;
use crate::db::models::BinaryData;
use sqlx::SqliteConnection;

/// Repository for datum preimages
pub struct BinaryDataRepository;

impl BinaryDataRepository {
    /// Insert (or replace) a datum preimage.
    pub async fn insert(conn: &mut SqliteConnection, datum_hash: &str, data: &[u8]) -> DbResult<()> {
        sqlx::query("INSERT OR REPLACE INTO binary_data (datum_hash, data) VALUES (?, ?)")
            .bind(datum_hash)
            .bind(data)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Fetch a datum preimage by hash.
    pub async fn get(conn: &mut SqliteConnection, datum_hash: &str) -> DbResult<Option<BinaryData>> {
        let row = sqlx::query_as::<_, BinaryData>(
            "SELECT datum_hash, data FROM binary_data WHERE datum_hash = ?",
        )
        .bind(datum_hash)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Delete preimages no longer referenced by any input.
    pub async fn prune_orphans(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM binary_data WHERE NOT EXISTS \
             (SELECT 1 FROM inputs WHERE inputs.datum_hash = binary_data.datum_hash)",
        )
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
