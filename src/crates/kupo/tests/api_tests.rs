//! End-to-end scenarios driven through the HTTP surface, with the consumer
//! fed by a scripted producer.

mod common;

use common::*;
use kupo::chain::{Pattern, Point};
use kupo::consumer::producer::ChainEvent;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_sync_then_query_matches_and_checkpoints() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    let addr = address(0x11);
    for slot in [10, 20, 30] {
        feed_block(&app, slot, &addr).await;
    }

    let (status, matches) = body_lines(app.get("/matches/*").await).await;
    assert_eq!(status, 200);
    assert_eq!(matches.len(), 3);
    let slots: Vec<u64> = matches
        .iter()
        .map(|m| m["created_at"]["slot_no"].as_u64().unwrap())
        .collect();
    assert_eq!(slots, vec![30, 20, 10], "most recent first by default");
    assert_eq!(matches[0]["address"], addr);
    assert_eq!(matches[0]["value"]["coins"], 1_000_000);

    let (status, checkpoints) = body_lines(app.get("/checkpoints").await).await;
    assert_eq!(status, 200);
    let slots: Vec<u64> = checkpoints
        .iter()
        .map(|c| c["slot_no"].as_u64().unwrap())
        .collect();
    assert_eq!(slots, vec![30, 20, 10]);

    app.shutdown().await;
}

#[tokio::test]
async fn test_rollback_then_checkpoint_lookups() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    let addr = address(0x11);
    for slot in [10, 20, 30] {
        feed_block(&app, slot, &addr).await;
    }
    app.feed(ChainEvent::RollBackward {
        point: tip(20),
        tip: tip(20),
    })
    .await;
    app.wait_for_checkpoint(20).await;

    let (_, matches) = body_lines(app.get("/matches/*").await).await;
    assert_eq!(matches.len(), 2);

    let (status, exact) = body_json(app.get("/checkpoints/20?strict=true").await).await;
    assert_eq!(status, 200);
    assert_eq!(exact["slot_no"], 20);
    assert_eq!(exact["header_hash"], header_hash(20));

    let (_, missing) = body_json(app.get("/checkpoints/25?strict=true").await).await;
    assert_eq!(missing, serde_json::Value::Null);

    let (_, ancestor) = body_json(app.get("/checkpoints/25?strict=false").await).await;
    assert_eq!(ancestor["slot_no"], 20);

    app.shutdown().await;
}

#[tokio::test]
async fn test_put_pattern_forces_rollback_and_backfills() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    let addr_x = address(0x11);
    let addr_y = address(0x22);
    for slot in [10, 20, 30] {
        feed_block(&app, slot, &addr_x).await;
    }

    let response = app
        .put_json(
            &format!("/patterns/{}", addr_y),
            json!({ "since": format!("15.{}", header_hash(15)), "limit": "within_safe_zone" }),
        )
        .await;
    let (status, patterns) = body_json(response).await;
    assert_eq!(status, 200);
    let listed: Vec<&str> = patterns
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert!(listed.contains(&"*"));
    assert!(listed.contains(&addr_y.as_str()));

    // Everything after slot 15 was retracted.
    let (_, matches) = body_lines(app.get("/matches/*").await).await;
    assert_eq!(matches.len(), 1);

    // The producer replays from 15; Y-outputs are now indexed.
    app.feed(ChainEvent::RollForward {
        block: block(20, &[addr_x.clone(), addr_y.clone()]),
        tip: tip(20),
    })
    .await;
    app.wait_for_checkpoint(20).await;

    let (_, matches) = body_lines(app.get(&format!("/matches/{}", addr_y)).await).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["address"], addr_y);

    app.shutdown().await;
}

#[tokio::test]
async fn test_put_pattern_beyond_safe_zone_is_rejected() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    feed_block(&app, 500, &address(0x11)).await;

    let response = app
        .put_json(
            &format!("/patterns/{}", address(0x22)),
            json!({ "since": format!("10.{}", header_hash(10)), "limit": "within_safe_zone" }),
        )
        .await;
    let (status, body) = body_json(response).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "unsafeRollbackBeyondSafeZone");

    app.shutdown().await;
}

#[tokio::test]
async fn test_delete_matches_guarded_by_active_patterns() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    let addr = address(0x11);
    for slot in [10, 20] {
        feed_block(&app, slot, &addr).await;
    }

    let (status, body) = body_json(app.delete("/matches/*").await).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "stillActivePattern");

    let (status, body) = body_json(app.delete("/patterns/*").await).await;
    assert_eq!(status, 200);
    assert_eq!(body["deleted"], 1);

    let (status, body) = body_json(app.delete("/matches/*").await).await;
    assert_eq!(status, 200);
    assert_eq!(body["deleted"], 2);

    app.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_readers_see_consistent_prefixes() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    let addr = address(0x11);

    // Readers hammer /matches/* while the consumer ingests.
    let mut readers = Vec::new();
    for _ in 0..10 {
        let router = app.router.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = Vec::new();
            for _ in 0..5 {
                let response = router
                    .clone()
                    .oneshot(
                        axum::http::Request::get("/matches/*")
                            .body(axum::body::Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                let (status, lines) = body_lines(response).await;
                assert_eq!(status, 200);
                // Within one response, creation slots decrease and no
                // output appears twice.
                let slots: Vec<u64> = lines
                    .iter()
                    .map(|m| m["created_at"]["slot_no"].as_u64().unwrap())
                    .collect();
                let mut sorted = slots.clone();
                sorted.sort_unstable_by(|a, b| b.cmp(a));
                assert_eq!(slots, sorted);
                let unique: std::collections::HashSet<_> = slots.iter().collect();
                assert_eq!(unique.len(), slots.len());
                observed.push(slots.len());
            }
            observed
        }));
    }

    for slot in 1..=100 {
        app.feed(kupo::consumer::producer::ChainEvent::RollForward {
            block: block(slot, &[addr.clone()]),
            tip: tip(100),
        })
        .await;
    }
    app.wait_for_checkpoint(100).await;

    for reader in readers {
        let observed = reader.await.unwrap();
        // Counts only ever grow as ingestion proceeds.
        let mut sorted = observed.clone();
        sorted.sort_unstable();
        assert_eq!(observed, sorted);
    }

    let (_, matches) = body_lines(app.get("/matches/*").await).await;
    assert_eq!(matches.len(), 100);

    app.shutdown().await;
}

#[tokio::test]
async fn test_datum_lookup_null_and_malformed() {
    let app = TestApp::start(vec![Pattern::Any]).await;

    let (status, body) = body_json(app.get(&format!("/datums/{}", "0".repeat(64))).await).await;
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::Value::Null);

    let (status, body) = body_json(app.get("/datums/zz").await).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "malformedDatumHash");

    app.shutdown().await;
}

#[tokio::test]
async fn test_health_content_negotiation() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    feed_block(&app, 10, &address(0x11)).await;

    let (status, body) = body_json(
        app.request(
            axum::http::Request::get("/health")
                .header("accept", "application/json")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["connection_status"], "connected");
    assert_eq!(body["most_recent_checkpoint"]["slot_no"], 10);

    let (status, text) = body_text(
        app.request(
            axum::http::Request::get("/health")
                .header("accept", "text/plain")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(status, 200);
    assert!(text.contains("kupo_connection_status 1"));
    assert!(text.contains("kupo_most_recent_checkpoint 10"));

    let (status, body) = body_json(
        app.request(
            axum::http::Request::get("/health")
                .header("accept", "application/xml")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(status, 415);
    assert_eq!(body["code"], "unsupportedContentType");

    app.shutdown().await;
}

#[tokio::test]
async fn test_checkpoint_header_on_responses() {
    let app = TestApp::start(vec![Pattern::Any]).await;
    feed_block(&app, 42, &address(0x11)).await;

    let response = app.get("/patterns").await;
    assert_eq!(
        response
            .headers()
            .get("X-Most-Recent-Checkpoint")
            .and_then(|v| v.to_str().ok()),
        Some("42")
    );

    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let app = TestApp::start(vec![]).await;

    let (status, body) = body_json(app.get("/nope").await).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "notFound");

    let (status, body) = body_json(app.delete("/checkpoints").await).await;
    assert_eq!(status, 405);
    assert_eq!(body["code"], "methodNotAllowed");

    let (status, body) = body_json(app.get("/matches/not-a-pattern").await).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalidPattern");

    app.shutdown().await;
}

#[tokio::test]
async fn test_metadata_streams_from_fetched_block() {
    use kupo::chain::{Block, Transaction};

    let mut fetched = Block {
        slot_no: 10,
        header_hash: header_hash(10),
        transactions: vec![Transaction {
            id: transaction_id(10),
            metadata: Some(vec![0xa1, 0x00, 0xa0]),
            ..Transaction::default()
        }],
    };
    fetched.transactions.push(Transaction {
        id: transaction_id(11),
        ..Transaction::default()
    });

    let app = TestApp::start_with(vec![Pattern::Any], Some(fetched)).await;
    feed_block(&app, 10, &address(0x11)).await;

    let response = app.get("/metadata/10").await;
    assert_eq!(
        response
            .headers()
            .get("X-Block-Header-Hash")
            .and_then(|v| v.to_str().ok()),
        Some(header_hash(10).as_str())
    );
    let (status, lines) = body_lines(response).await;
    assert_eq!(status, 200);
    assert_eq!(lines.len(), 1, "only the transaction carrying metadata");
    assert_eq!(lines[0]["transaction_id"], transaction_id(10));
    assert_eq!(lines[0]["raw"], "a100a0");

    // Below the first known block: no ancestor.
    let app2 = TestApp::start(vec![Pattern::Any]).await;
    feed_block(&app2, 10, &address(0x11)).await;
    let (status, body) = body_json(app2.get("/metadata/5").await).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "noAncestor");

    app.shutdown().await;
    app2.shutdown().await;
}

#[tokio::test]
async fn test_patterns_listing_and_inclusion() {
    let app = TestApp::start(vec![Pattern::Any]).await;

    let (status, body) = body_json(app.get("/patterns").await).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!(["*"]));

    // '*' includes every registered pattern.
    let (_, body) = body_json(app.get("/patterns/*").await).await;
    assert_eq!(body, json!(["*"]));

    app.shutdown().await;
}

#[tokio::test]
async fn test_spent_and_unspent_filters() {
    use kupo::chain::{OutputReference, Transaction, TransactionOutput, Value};

    let app = TestApp::start(vec![Pattern::Any]).await;
    let addr = address(0x11);
    feed_block(&app, 10, &addr).await;

    // Block 20 spends the output created at slot 10.
    let spending = kupo::chain::Block {
        slot_no: 20,
        header_hash: header_hash(20),
        transactions: vec![Transaction {
            id: transaction_id(20),
            inputs: vec![OutputReference {
                transaction_id: transaction_id(10),
                output_index: 0,
            }],
            outputs: vec![TransactionOutput {
                address: addr.clone(),
                value: Value::new(900_000),
                datum_hash: None,
                script_hash: None,
            }],
            ..Transaction::default()
        }],
    };
    app.feed(ChainEvent::RollForward {
        block: spending,
        tip: tip(20),
    })
    .await;
    app.wait_for_checkpoint(20).await;

    let (_, unspent) = body_lines(app.get("/matches/*?unspent").await).await;
    assert_eq!(unspent.len(), 1);
    assert_eq!(unspent[0]["created_at"]["slot_no"], 20);

    let (_, spent) = body_lines(app.get("/matches/*?spent").await).await;
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0]["spent_at"]["transaction_id"], transaction_id(20));

    // Rolling back to slot 10 clears the spent marker.
    app.feed(ChainEvent::RollBackward {
        point: Point::at(10, header_hash(10)),
        tip: tip(10),
    })
    .await;
    app.wait_for_checkpoint(10).await;
    let (_, spent) = body_lines(app.get("/matches/*?spent").await).await;
    assert_eq!(spent.len(), 0);
    let (_, unspent) = body_lines(app.get("/matches/*?unspent").await).await;
    assert_eq!(unspent.len(), 1);

    app.shutdown().await;
}
