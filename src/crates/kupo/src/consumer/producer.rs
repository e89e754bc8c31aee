//! Producer seam
//!
//! The upstream block provider is an external collaborator; the consumer
//! only sees these traits. Events mirror the chain-sync protocol: roll
//! forward with a block, or roll backward to a point.

use crate::chain::{Block, Point};
use async_trait::async_trait;
use thiserror::Error;

/// A chain-sync event delivered by the producer.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A new block extends the chain.
    RollForward { block: Block, tip: Point },
    /// The chain was rolled back to an earlier point.
    RollBackward { point: Point, tip: Point },
}

/// Errors surfaced by a producer.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Transient: the producer cannot be reached. Retried with backoff.
    #[error("producer unreachable: {0}")]
    Unreachable(String),

    /// The producer sent something the client cannot make sense of.
    #[error("producer protocol error: {0}")]
    Protocol(String),

    /// A read timed out; repeated timeouts count as disconnection.
    #[error("timed out waiting for the producer")]
    Timeout,
}

/// The chain-sync side of the producer, owned by the consumer.
#[async_trait]
pub trait ChainProducer: Send {
    /// (Re-)establish the session.
    async fn connect(&mut self) -> Result<(), ProducerError>;

    /// Negotiate an intersection; candidates are ordered most recent first.
    /// Returns the agreed point, or `None` when no candidate is on the
    /// producer's chain.
    async fn find_intersection(
        &mut self,
        candidates: &[Point],
    ) -> Result<Option<Point>, ProducerError>;

    /// Await the next chain-sync event.
    async fn next_event(&mut self) -> Result<ChainEvent, ProducerError>;
}

/// Block-by-point retrieval, used by the metadata endpoint.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Fetch the whole block at the given point, if the producer knows it.
    async fn fetch_block(&self, point: &Point) -> Result<Option<Block>, ProducerError>;
}
