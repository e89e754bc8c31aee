//! Script repository for database operations

use crate::db::error::DbResult;
use crate::db::models::ScriptRow;
use sqlx::SqliteConnection;

/// Repository for scripts
pub struct ScriptRepository;

impl ScriptRepository {
    /// Insert (or replace) a script.
    pub async fn insert(
        conn: &mut SqliteConnection,
        script_hash: &str,
        script: &[u8],
        language: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO scripts (script_hash, script, language) VALUES (?, ?, ?)",
        )
        .bind(script_hash)
        .bind(script)
        .bind(language)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Fetch a script by hash.
    pub async fn get(conn: &mut SqliteConnection, script_hash: &str) -> DbResult<Option<ScriptRow>> {
        let row = sqlx::query_as::<_, ScriptRow>(
            "SELECT script_hash, script, language FROM scripts WHERE script_hash = ?",
        )
        .bind(script_hash)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Delete scripts no longer referenced by any input.
    pub async fn prune_orphans(conn: &mut SqliteConnection) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM scripts WHERE NOT EXISTS \
             (SELECT 1 FROM inputs WHERE inputs.script_hash = scripts.script_hash)",
        )
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
