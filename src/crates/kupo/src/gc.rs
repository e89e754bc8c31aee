//! Garbage collector
//!
//! Periodic pruning of spent inputs and orphaned binary artifacts. Each pass
//! runs inside the long-lived writer lock, so it never races the consumer's
//! block ingestion.

use crate::config::InputManagementMode;
use crate::db::repositories::{BinaryDataRepository, CheckpointRepository, InputRepository, ScriptRepository};
use crate::db::{Database, DbResult};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Periodic garbage collection task.
pub struct GarbageCollector {
    db: Database,
    interval: Duration,
    mode: InputManagementMode,
    longest_rollback: u64,
}

impl GarbageCollector {
    pub fn new(
        db: Database,
        interval: Duration,
        mode: InputManagementMode,
        longest_rollback: u64,
    ) -> Self {
        Self {
            db,
            interval,
            mode,
            longest_rollback,
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; swallow it so the first pass
        // happens one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.collect().await {
                        warn!(target: "kupo::gc", "garbage collection failed: {}", err);
                    }
                }
            }
        }
        debug!(target: "kupo::gc", "garbage collector stopped");
    }

    /// One collection pass.
    pub async fn collect(&self) -> DbResult<()> {
        let mut tx = self.db.begin_exclusive().await?;

        let pruned_inputs = match self.mode {
            InputManagementMode::RemoveSpentInputs => {
                let tip = CheckpointRepository::latest(tx.conn()).await?;
                match tip {
                    Some(tip) => {
                        let horizon = (tip.slot_no as u64).saturating_sub(self.longest_rollback);
                        InputRepository::prune_spent(tx.conn(), horizon).await?
                    }
                    None => 0,
                }
            }
            InputManagementMode::MarkSpentInputs => 0,
        };

        let pruned_datums = BinaryDataRepository::prune_orphans(tx.conn()).await?;
        let pruned_scripts = ScriptRepository::prune_orphans(tx.conn()).await?;
        tx.commit().await?;

        info!(
            target: "kupo::gc",
            inputs = pruned_inputs,
            binary_data = pruned_datums,
            scripts = pruned_scripts,
            "garbage collection pass complete"
        );
        Ok(())
    }
}
