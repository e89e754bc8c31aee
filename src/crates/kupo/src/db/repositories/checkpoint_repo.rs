//! Checkpoint repository for database operations
//!
//! Checkpoints form a bounded ring: every checkpoint within the rollback
//! horizon of the tip is preserved, older ones are thinned exponentially so
//! that resumption candidates remain at every power-of-two slot distance.

use crate::db::error::DbResult;
use crate::db::models::Checkpoint;
use sqlx::SqliteConnection;
use std::collections::HashSet;

/// Checkpoint repository for managing resume/rollback anchors
pub struct CheckpointRepository;

impl CheckpointRepository {
    /// Insert (or replace) a checkpoint.
    pub async fn insert(
        conn: &mut SqliteConnection,
        slot_no: u64,
        header_hash: &str,
    ) -> DbResult<()> {
        sqlx::query("INSERT OR REPLACE INTO checkpoints (slot_no, header_hash) VALUES (?, ?)")
            .bind(slot_no as i64)
            .bind(header_hash)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// List all checkpoints, most recent first.
    pub async fn list_desc(conn: &mut SqliteConnection) -> DbResult<Vec<Checkpoint>> {
        let rows = sqlx::query_as::<_, Checkpoint>(
            "SELECT slot_no, header_hash FROM checkpoints ORDER BY slot_no DESC",
        )
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// The most recent checkpoint, if any.
    pub async fn latest(conn: &mut SqliteConnection) -> DbResult<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, Checkpoint>(
            "SELECT slot_no, header_hash FROM checkpoints ORDER BY slot_no DESC LIMIT 1",
        )
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// The checkpoint exactly at the given slot, if any.
    pub async fn at_slot(conn: &mut SqliteConnection, slot_no: u64) -> DbResult<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, Checkpoint>(
            "SELECT slot_no, header_hash FROM checkpoints WHERE slot_no = ?",
        )
        .bind(slot_no as i64)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// The closest checkpoint at or before the given slot, if any.
    pub async fn closest_ancestor(
        conn: &mut SqliteConnection,
        slot_no: u64,
    ) -> DbResult<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, Checkpoint>(
            "SELECT slot_no, header_hash FROM checkpoints WHERE slot_no <= ? \
             ORDER BY slot_no DESC LIMIT 1",
        )
        .bind(slot_no as i64)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Delete checkpoints strictly after the given slot. Passing -1 clears
    /// the whole ring (rollback to origin).
    pub async fn delete_after(conn: &mut SqliteConnection, slot_no: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE slot_no > ?")
            .bind(slot_no)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Thin the ring relative to the given tip.
    ///
    /// Keeps every checkpoint within `longest_rollback` slots of the tip,
    /// the nearest one beyond, and the nearest one at or below each
    /// power-of-two slot distance backwards from the tip.
    pub async fn prune(
        conn: &mut SqliteConnection,
        tip_slot: u64,
        longest_rollback: u64,
    ) -> DbResult<u64> {
        let slots: Vec<(i64,)> =
            sqlx::query_as("SELECT slot_no FROM checkpoints ORDER BY slot_no DESC")
                .fetch_all(&mut *conn)
                .await?;
        let slots: Vec<u64> = slots.into_iter().map(|(s,)| s as u64).collect();

        let keep = Self::coverage(&slots, tip_slot, longest_rollback);
        let mut dropped = 0;
        for slot in slots {
            if !keep.contains(&slot) {
                let result = sqlx::query("DELETE FROM checkpoints WHERE slot_no = ?")
                    .bind(slot as i64)
                    .execute(&mut *conn)
                    .await?;
                dropped += result.rows_affected();
            }
        }
        Ok(dropped)
    }

    /// The set of slots the coverage policy retains. `slots` must be sorted
    /// descending.
    fn coverage(slots: &[u64], tip_slot: u64, longest_rollback: u64) -> HashSet<u64> {
        let horizon = tip_slot.saturating_sub(longest_rollback);
        let mut keep: HashSet<u64> = slots.iter().copied().filter(|&s| s >= horizon).collect();

        // Nearest checkpoint beyond the horizon.
        if let Some(&nearest) = slots.iter().find(|&&s| s < horizon) {
            keep.insert(nearest);
        }

        // One checkpoint per power-of-two distance backwards.
        let mut distance: u64 = 1;
        loop {
            if distance > tip_slot {
                break;
            }
            if distance > longest_rollback {
                let boundary = tip_slot - distance;
                if let Some(&nearest) = slots.iter().find(|&&s| s <= boundary) {
                    keep.insert(nearest);
                }
            }
            match distance.checked_mul(2) {
                Some(next) => distance = next,
                None => break,
            }
        }
        keep
    }
}
