//! Pattern repository for database operations
//!
//! Registered patterns are persisted so they survive restarts; the registry
//! is seeded from this table at startup.

use crate::chain::Pattern;
use crate::db::error::{DatabaseError, DbResult};
use crate::db::models::PatternRow;
use sqlx::SqliteConnection;

/// Repository for registered patterns
pub struct PatternRepository;

impl PatternRepository {
    /// Insert a pattern in its canonical text form.
    pub async fn insert(conn: &mut SqliteConnection, pattern: &Pattern) -> DbResult<()> {
        sqlx::query("INSERT OR IGNORE INTO patterns (pattern) VALUES (?)")
            .bind(pattern.to_string())
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Remove a pattern. Returns whether a row was deleted.
    pub async fn delete(conn: &mut SqliteConnection, pattern: &Pattern) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM patterns WHERE pattern = ?")
            .bind(pattern.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all persisted patterns.
    pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<Pattern>> {
        let rows = sqlx::query_as::<_, PatternRow>("SELECT pattern FROM patterns ORDER BY pattern")
            .fetch_all(conn)
            .await?;
        rows.into_iter()
            .map(|row| {
                row.pattern.parse().map_err(|_| {
                    DatabaseError::UnexpectedRow(format!("invalid stored pattern: {}", row.pattern))
                })
            })
            .collect()
    }
}
