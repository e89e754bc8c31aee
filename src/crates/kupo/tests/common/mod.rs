//! Shared fixtures for the integration suites: an in-process daemon with a
//! channel-fed producer, plus block and address builders.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use kupo::api::routes::{create_router, AppState};
use kupo::chain::{Block, Pattern, Point, Transaction, TransactionOutput, Value};
use kupo::config::InputManagementMode;
use kupo::consumer::producer::{BlockFetcher, ChainEvent, ChainProducer, ProducerError};
use kupo::consumer::{ChainConsumer, ConsumerError, ForcedRollbackSender};
use kupo::db::Database;
use kupo::health::Health;
use kupo::registry::PatternRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

/// Producer fed by the test through a channel. Intersection accepts the most
/// recent candidate, like a producer whose chain contains them all.
pub struct ChannelProducer {
    events: mpsc::Receiver<ChainEvent>,
}

#[async_trait]
impl ChainProducer for ChannelProducer {
    async fn connect(&mut self) -> Result<(), ProducerError> {
        Ok(())
    }

    async fn find_intersection(
        &mut self,
        candidates: &[Point],
    ) -> Result<Option<Point>, ProducerError> {
        Ok(candidates.first().cloned())
    }

    async fn next_event(&mut self) -> Result<ChainEvent, ProducerError> {
        match self.events.recv().await {
            Some(event) => Ok(event),
            None => std::future::pending().await,
        }
    }
}

/// Block fetcher returning a preconfigured block regardless of point.
pub struct StubFetcher {
    pub block: Option<Block>,
}

#[async_trait]
impl BlockFetcher for StubFetcher {
    async fn fetch_block(&self, _point: &Point) -> Result<Option<Block>, ProducerError> {
        Ok(self.block.clone())
    }
}

/// A full in-process daemon: consumer task + router, sharing one in-memory
/// database.
pub struct TestApp {
    pub db: Database,
    pub router: Router,
    pub health: Health,
    pub registry: PatternRegistry,
    pub events_tx: mpsc::Sender<ChainEvent>,
    pub rollback_tx: ForcedRollbackSender,
    shutdown_tx: watch::Sender<bool>,
    consumer: tokio::task::JoinHandle<Result<(), ConsumerError>>,
}

impl TestApp {
    pub async fn start(patterns: Vec<Pattern>) -> Self {
        Self::start_with(patterns, None).await
    }

    pub async fn start_with(patterns: Vec<Pattern>, fetched_block: Option<Block>) -> Self {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db.install_indexes().await.unwrap();

        let registry = PatternRegistry::with_patterns(patterns);
        let health = Health::new(InputManagementMode::MarkSpentInputs, false);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (rollback_tx, rollback_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = ChainConsumer::new(
            ChannelProducer { events: events_rx },
            db.clone(),
            registry.clone(),
            health.clone(),
            rollback_rx,
            Some(Point::Origin),
            100,
        );
        let consumer = tokio::spawn(consumer.run(shutdown_rx));

        let state = AppState {
            db: db.clone(),
            registry: registry.clone(),
            health: health.clone(),
            rollback_tx: rollback_tx.clone(),
            fetcher: Arc::new(StubFetcher {
                block: fetched_block,
            }),
            longest_rollback: 100,
        };
        let router = create_router(state);

        TestApp {
            db,
            router,
            health,
            registry,
            events_tx,
            rollback_tx,
            shutdown_tx,
            consumer,
        }
    }

    /// Feed one chain-sync event to the consumer.
    pub async fn feed(&self, event: ChainEvent) {
        self.events_tx.send(event).await.unwrap();
    }

    /// Wait until the most recent checkpoint reaches the given slot.
    pub async fn wait_for_checkpoint(&self, slot_no: u64) {
        for _ in 0..500 {
            if self.health.most_recent_checkpoint().and_then(|p| p.slot_no()) == Some(slot_no) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("checkpoint {} never appeared", slot_no);
    }

    /// Issue one request against the router.
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.request(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn put_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.request(
            Request::put(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn shutdown(self) {
        self.shutdown_tx.send(true).unwrap();
        self.consumer.await.unwrap().unwrap();
    }
}

/// Read a whole response body as text.
pub async fn body_text(response: Response<Body>) -> (StatusCode, String) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Read a JSON response body.
pub async fn body_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let (status, text) = body_text(response).await;
    let json = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Split a newline-delimited JSON body into documents.
pub async fn body_lines(response: Response<Body>) -> (StatusCode, Vec<serde_json::Value>) {
    let (status, text) = body_text(response).await;
    let lines = text
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (status, lines)
}

/// A hex enterprise address with the given payment credential byte.
pub fn address(credential_byte: u8) -> String {
    let mut bytes = vec![0x60];
    bytes.extend(std::iter::repeat(credential_byte).take(28));
    hex::encode(bytes)
}

pub fn header_hash(slot_no: u64) -> String {
    format!("{:064x}", slot_no)
}

pub fn transaction_id(slot_no: u64) -> String {
    format!("{:064x}", slot_no + 0xaaaa)
}

pub fn tip(slot_no: u64) -> Point {
    Point::at(slot_no, header_hash(slot_no))
}

/// A block with one transaction producing one output per address.
pub fn block(slot_no: u64, addresses: &[String]) -> Block {
    Block {
        slot_no,
        header_hash: header_hash(slot_no),
        transactions: vec![Transaction {
            id: transaction_id(slot_no),
            outputs: addresses
                .iter()
                .map(|address| TransactionOutput {
                    address: address.clone(),
                    value: Value::new(1_000_000),
                    datum_hash: None,
                    script_hash: None,
                })
                .collect(),
            ..Transaction::default()
        }],
    }
}

/// Roll the app forward by one single-output block.
pub async fn feed_block(app: &TestApp, slot_no: u64, address_text: &str) {
    app.feed(ChainEvent::RollForward {
        block: block(slot_no, &[address_text.to_string()]),
        tip: tip(slot_no),
    })
    .await;
    app.wait_for_checkpoint(slot_no).await;
}
