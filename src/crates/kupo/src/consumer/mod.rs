//! Chain consumer
//!
//! The long-lived writer: a state machine following the producer's chain,
//! folding blocks into rows and reacting to rollbacks.
//!
//! States: Initializing -> Intersecting -> Following <-> ForcedRollback,
//! terminal Stopped. All persistence effects of block N commit before any
//! effect of block N+1 becomes visible; the checkpoint is written inside the
//! same transaction as the block's inputs; the registry is sampled once per
//! block, at the boundary.

pub mod ogmios;
pub mod producer;

use crate::chain::{address, Pattern, Point};
use crate::db::models::Input;
use crate::db::repositories::{
    BinaryDataRepository, CheckpointRepository, InputRepository, PatternRepository,
    ScriptRepository,
};
use crate::db::{Database, DatabaseError};
use crate::health::Health;
use crate::registry::PatternRegistry;
use producer::{ChainEvent, ChainProducer, ProducerError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub use ogmios::{OgmiosBlockFetcher, OgmiosProducer};
pub use producer::BlockFetcher;

/// Initial producer reconnection delay; doubles up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Whether a forced rollback may cross the rollback horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackLimit {
    WithinSafeZone,
    Any,
}

/// Why a forced rollback was refused.
#[derive(Debug, Error)]
pub enum ForcedRollbackError {
    #[error("rollback target lies beyond the safe zone")]
    BeyondSafeZone,
    #[error("failed to rollback: {0}")]
    Failed(String),
}

/// A forced-rollback request handed from the HTTP layer to the consumer.
///
/// The consumer is the sole fulfiller of `reply`. When `pattern` is set, it
/// is persisted inside the same transaction as the rollback and inserted
/// into the registry before the reply fires, so a successful reply implies
/// both are visible.
#[derive(Debug)]
pub struct ForcedRollback {
    pub point: Point,
    pub limit: RollbackLimit,
    pub pattern: Option<Pattern>,
    pub reply: oneshot::Sender<Result<Point, ForcedRollbackError>>,
}

/// Sender half handed to the HTTP layer.
pub type ForcedRollbackSender = mpsc::Sender<ForcedRollback>;

/// Errors terminating the consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// No common point with the producer and no way to recover.
    #[error("intersection not found: {hint}")]
    IntersectionNotFound { hint: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error("codec failure: {0}")]
    Codec(String),
}

enum Flow {
    Continue,
    Reintersect,
}

/// The chain-follower state machine.
pub struct ChainConsumer<P> {
    producer: P,
    db: Database,
    registry: PatternRegistry,
    health: Health,
    rollback_rx: mpsc::Receiver<ForcedRollback>,
    since: Option<Point>,
    longest_rollback: u64,
}

impl<P: ChainProducer> ChainConsumer<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        producer: P,
        db: Database,
        registry: PatternRegistry,
        health: Health,
        rollback_rx: mpsc::Receiver<ForcedRollback>,
        since: Option<Point>,
        longest_rollback: u64,
    ) -> Self {
        Self {
            producer,
            db,
            registry,
            health,
            rollback_rx,
            since,
            longest_rollback,
        }
    }

    /// Run until shutdown is signalled or a fatal error occurs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        let mut backoff = INITIAL_BACKOFF;
        'reconnect: loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(err) = self.producer.connect().await {
                self.health.set_connected(false);
                warn!(target: "kupo::consumer", "{}; retrying in {:?}", err, backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }

            let start = match self.intersect().await {
                Ok(point) => point,
                Err(ConsumerError::Producer(err)) => {
                    self.health.set_connected(false);
                    warn!(target: "kupo::consumer", "{}; retrying in {:?}", err, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
                Err(err) => return Err(err),
            };
            backoff = INITIAL_BACKOFF;
            self.health.set_connected(true);
            info!(target: "kupo::consumer", %start, "following the chain");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break 'reconnect,
                    Some(request) = self.rollback_rx.recv() => {
                        match self.handle_forced_rollback(request).await? {
                            Flow::Continue => {}
                            Flow::Reintersect => continue 'reconnect,
                        }
                    }
                    event = self.producer.next_event() => match event {
                        Ok(ChainEvent::RollForward { block, tip }) => {
                            self.roll_forward_transaction(&block).await?;
                            self.health.set_checkpoint(block.point());
                            self.health.set_node_tip(tip);
                        }
                        Ok(ChainEvent::RollBackward { point, tip }) => {
                            let new_tip = self.rollback_transaction(&point, None).await?;
                            debug!(target: "kupo::consumer", %point, "rolled back");
                            self.update_checkpoint_health(&new_tip);
                            self.health.set_node_tip(tip);
                        }
                        Err(err @ (ProducerError::Unreachable(_) | ProducerError::Timeout)) => {
                            self.health.set_connected(false);
                            warn!(target: "kupo::consumer", "{}; reconnecting", err);
                            continue 'reconnect;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
        info!(target: "kupo::consumer", "consumer stopped");
        Ok(())
    }

    /// Negotiate a starting point with the producer.
    ///
    /// Candidates are the persisted checkpoints, most recent first. With no
    /// usable checkpoint, `--since` decides; with neither, this is a
    /// configuration problem.
    async fn intersect(&mut self) -> Result<Point, ConsumerError> {
        let mut tx = self.db.begin_read().await?;
        let checkpoints = CheckpointRepository::list_desc(tx.conn()).await?;
        tx.commit().await?;

        let had_checkpoints = !checkpoints.is_empty();
        if had_checkpoints {
            let candidates: Vec<Point> = checkpoints.iter().map(|c| c.point()).collect();
            if let Some(point) = self.producer.find_intersection(&candidates).await? {
                return Ok(point);
            }
        }

        if let Some(since) = self.since.clone() {
            if let Some(point) = self.producer.find_intersection(&[since]).await? {
                return Ok(point);
            }
            return Err(ConsumerError::IntersectionNotFound {
                hint: "the --since point is not on the producer's chain; \
                       double-check the slot and header hash"
                    .into(),
            });
        }

        if had_checkpoints {
            // All checkpoints were rolled past; resync from genesis.
            if let Some(point) = self.producer.find_intersection(&[Point::Origin]).await? {
                return Ok(point);
            }
        }

        Err(ConsumerError::IntersectionNotFound {
            hint: "no persisted checkpoint and no --since; \
                   provide --since (e.g. --since origin) on first start"
                .into(),
        })
    }

    /// Fold one block into storage, inside a single writer transaction.
    async fn roll_forward_transaction(&self, block: &crate::chain::Block) -> Result<(), ConsumerError> {
        let patterns = self.registry.snapshot();
        let point = block.point();
        let mut tx = self.db.begin_exclusive().await?;
        let mut matched = 0u64;

        for transaction in &block.transactions {
            for (index, output) in transaction.outputs.iter().enumerate() {
                let index = index as u64;
                let credentials = address::extract_credentials(&output.address);
                let candidate = transaction.candidate(index, output, &credentials);
                if !patterns.iter().any(|pattern| pattern.matches(&candidate)) {
                    continue;
                }
                let value = output
                    .value
                    .to_cbor()
                    .map_err(|e| ConsumerError::Codec(e.to_string()))?;
                let input = Input::from_output(
                    &transaction.id,
                    index,
                    output,
                    &credentials,
                    value,
                    &point,
                );
                InputRepository::insert(tx.conn(), &input).await?;
                InputRepository::insert_policies(
                    tx.conn(),
                    &transaction.id,
                    index,
                    output.value.policies(),
                )
                .await?;
                if let Some(hash) = &output.datum_hash {
                    if let Some(data) = transaction.datums.get(hash) {
                        BinaryDataRepository::insert(tx.conn(), hash, data).await?;
                    }
                }
                if let Some(hash) = &output.script_hash {
                    if let Some(script) = transaction.scripts.get(hash) {
                        ScriptRepository::insert(tx.conn(), hash, &script.bytes, &script.language)
                            .await?;
                    }
                }
                matched += 1;
            }

            for reference in &transaction.inputs {
                InputRepository::mark_spent(tx.conn(), reference, &point, &transaction.id).await?;
            }
        }

        CheckpointRepository::insert(tx.conn(), block.slot_no, &block.header_hash).await?;
        CheckpointRepository::prune(tx.conn(), block.slot_no, self.longest_rollback).await?;
        tx.commit().await?;

        debug!(
            target: "kupo::consumer",
            slot = block.slot_no,
            matched,
            "block ingested"
        );
        Ok(())
    }

    /// Retract everything after `point`, optionally persisting a new pattern
    /// in the same transaction. A target inside the horizon that was never
    /// checkpointed gets a synthetic checkpoint first (optimistic rollback).
    async fn rollback_transaction(
        &self,
        point: &Point,
        pattern: Option<&Pattern>,
    ) -> Result<Point, ConsumerError> {
        let mut tx = self.db.begin_exclusive().await?;
        let retained = match point {
            Point::Origin => -1,
            Point::At {
                slot_no,
                header_hash,
            } => {
                CheckpointRepository::insert(tx.conn(), *slot_no, header_hash).await?;
                *slot_no as i64
            }
        };
        InputRepository::rollback_to(tx.conn(), retained).await?;
        CheckpointRepository::delete_after(tx.conn(), retained).await?;
        if let Some(pattern) = pattern {
            PatternRepository::insert(tx.conn(), pattern).await?;
        }
        let new_tip = CheckpointRepository::latest(tx.conn()).await?;
        tx.commit().await?;
        Ok(new_tip.map(|c| c.point()).unwrap_or(Point::Origin))
    }

    async fn handle_forced_rollback(&mut self, request: ForcedRollback) -> Result<Flow, ConsumerError> {
        let ForcedRollback {
            point,
            limit,
            pattern,
            reply,
        } = request;

        let mut tx = self.db.begin_read().await?;
        let tip = CheckpointRepository::latest(tx.conn()).await?;
        tx.commit().await?;
        let tip_slot = tip.map(|c| c.slot_no as u64).unwrap_or(0);
        let distance = tip_slot.saturating_sub(point.slot_or_zero());

        if limit == RollbackLimit::WithinSafeZone && distance > self.longest_rollback {
            info!(target: "kupo::consumer", %point, "refusing rollback beyond the safe zone");
            let _ = reply.send(Err(ForcedRollbackError::BeyondSafeZone));
            return Ok(Flow::Continue);
        }

        match self.rollback_transaction(&point, pattern.as_ref()).await {
            Ok(new_tip) => {
                if let Some(pattern) = pattern {
                    self.registry.insert(pattern);
                }
                info!(target: "kupo::consumer", %point, "forced rollback complete");
                self.update_checkpoint_health(&new_tip);
                let _ = reply.send(Ok(new_tip));
                Ok(Flow::Reintersect)
            }
            Err(ConsumerError::Database(err)) if !err.is_fatal() => {
                warn!(target: "kupo::consumer", "forced rollback failed: {}", err);
                let _ = reply.send(Err(ForcedRollbackError::Failed(err.to_string())));
                Ok(Flow::Continue)
            }
            Err(err) => {
                let _ = reply.send(Err(ForcedRollbackError::Failed(err.to_string())));
                Err(err)
            }
        }
    }

    fn update_checkpoint_health(&self, tip: &Point) {
        match tip {
            Point::Origin => self.health.clear_checkpoint(),
            point => self.health.set_checkpoint(point.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Block, Transaction, TransactionOutput, Value};
    use crate::config::InputManagementMode;
    use async_trait::async_trait;

    struct ScriptedProducer {
        events: mpsc::Receiver<ChainEvent>,
        intersection: Option<Point>,
    }

    #[async_trait]
    impl ChainProducer for ScriptedProducer {
        async fn connect(&mut self) -> Result<(), ProducerError> {
            Ok(())
        }

        async fn find_intersection(
            &mut self,
            _candidates: &[Point],
        ) -> Result<Option<Point>, ProducerError> {
            Ok(self.intersection.clone())
        }

        async fn next_event(&mut self) -> Result<ChainEvent, ProducerError> {
            match self.events.recv().await {
                Some(event) => Ok(event),
                // Park forever once the script is exhausted.
                None => std::future::pending().await,
            }
        }
    }

    fn block(slot: u64, address: &str) -> Block {
        Block {
            slot_no: slot,
            header_hash: format!("{:02x}", slot).repeat(32),
            transactions: vec![Transaction {
                id: format!("{:02x}", slot + 1).repeat(32),
                outputs: vec![TransactionOutput {
                    address: address.to_string(),
                    value: Value::new(1_000_000),
                    datum_hash: None,
                    script_hash: None,
                }],
                ..Transaction::default()
            }],
        }
    }

    struct Harness {
        db: Database,
        health: Health,
        events_tx: mpsc::Sender<ChainEvent>,
        rollback_tx: ForcedRollbackSender,
        handle: tokio::task::JoinHandle<Result<(), ConsumerError>>,
        shutdown_tx: watch::Sender<bool>,
    }

    impl Harness {
        async fn shutdown(self) {
            self.shutdown_tx.send(true).unwrap();
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn setup() -> Harness {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let registry = PatternRegistry::with_patterns([Pattern::Any]);
        let health = Health::new(InputManagementMode::MarkSpentInputs, false);
        let (events_tx, events_rx) = mpsc::channel(16);
        let (rollback_tx, rollback_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = ChainConsumer::new(
            ScriptedProducer {
                events: events_rx,
                intersection: Some(Point::Origin),
            },
            db.clone(),
            registry,
            health.clone(),
            rollback_rx,
            Some(Point::Origin),
            100,
        );
        let handle = tokio::spawn(consumer.run(shutdown_rx));
        Harness {
            db,
            health,
            events_tx,
            rollback_tx,
            handle,
            shutdown_tx,
        }
    }

    async fn wait_for_checkpoint(health: &Health, slot: u64) {
        for _ in 0..200 {
            if health.most_recent_checkpoint().and_then(|p| p.slot_no()) == Some(slot) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("checkpoint {} never appeared", slot);
    }

    fn tip(slot: u64) -> Point {
        Point::at(slot, format!("{:02x}", slot).repeat(32))
    }

    #[tokio::test]
    async fn test_roll_forward_persists_matches_and_checkpoints() {
        let harness = setup().await;
        for slot in [10, 20, 30] {
            harness
                .events_tx
                .send(ChainEvent::RollForward { block: block(slot, "00aa"), tip: tip(30) })
                .await
                .unwrap();
        }
        wait_for_checkpoint(&harness.health, 30).await;

        let mut tx = harness.db.begin_read().await.unwrap();
        assert_eq!(InputRepository::count(tx.conn()).await.unwrap(), 3);
        let checkpoints = CheckpointRepository::list_desc(tx.conn()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            checkpoints.iter().map(|c| c.slot_no).collect::<Vec<_>>(),
            vec![30, 20, 10]
        );

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_roll_backward_retracts() {
        let harness = setup().await;
        for slot in [10, 20, 30] {
            harness
                .events_tx
                .send(ChainEvent::RollForward { block: block(slot, "00aa"), tip: tip(30) })
                .await
                .unwrap();
        }
        wait_for_checkpoint(&harness.health, 30).await;

        harness
            .events_tx
            .send(ChainEvent::RollBackward { point: tip(20), tip: tip(20) })
            .await
            .unwrap();
        wait_for_checkpoint(&harness.health, 20).await;

        let mut tx = harness.db.begin_read().await.unwrap();
        assert_eq!(InputRepository::count(tx.conn()).await.unwrap(), 2);
        tx.commit().await.unwrap();

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_forced_rollback_inserts_pattern_and_replies() {
        let harness = setup().await;
        for slot in [10, 20, 30] {
            harness
                .events_tx
                .send(ChainEvent::RollForward { block: block(slot, "00aa"), tip: tip(30) })
                .await
                .unwrap();
        }
        wait_for_checkpoint(&harness.health, 30).await;

        let (reply_tx, reply_rx) = oneshot::channel();
        harness
            .rollback_tx
            .send(ForcedRollback {
                point: tip(15),
                limit: RollbackLimit::WithinSafeZone,
                pattern: Some(Pattern::TransactionId("77".repeat(32))),
                reply: reply_tx,
            })
            .await
            .unwrap();
        let new_tip = reply_rx.await.unwrap().unwrap();
        assert_eq!(new_tip.slot_no(), Some(15));

        let mut tx = harness.db.begin_read().await.unwrap();
        // Blocks 20 and 30 are gone; the synthetic checkpoint at 15 anchors.
        assert_eq!(InputRepository::count(tx.conn()).await.unwrap(), 1);
        let patterns = PatternRepository::list(tx.conn()).await.unwrap();
        tx.commit().await.unwrap();
        assert!(patterns.contains(&Pattern::TransactionId("77".repeat(32))));

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_forced_rollback_beyond_safe_zone_is_refused() {
        let harness = setup().await;
        harness
            .events_tx
            .send(ChainEvent::RollForward { block: block(500, "00aa"), tip: tip(500) })
            .await
            .unwrap();
        wait_for_checkpoint(&harness.health, 500).await;

        let (reply_tx, reply_rx) = oneshot::channel();
        harness
            .rollback_tx
            .send(ForcedRollback {
                point: tip(10),
                limit: RollbackLimit::WithinSafeZone,
                pattern: None,
                reply: reply_tx,
            })
            .await
            .unwrap();
        assert!(matches!(
            reply_rx.await.unwrap(),
            Err(ForcedRollbackError::BeyondSafeZone)
        ));

        // State unchanged.
        let mut tx = harness.db.begin_read().await.unwrap();
        assert_eq!(InputRepository::count(tx.conn()).await.unwrap(), 1);
        tx.commit().await.unwrap();

        harness.shutdown().await;
    }
}
