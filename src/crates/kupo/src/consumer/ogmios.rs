//! Ogmios producer client
//!
//! JSON-RPC 2.0 over a WebSocket, as exposed by an Ogmios bridge sitting in
//! front of a node. The client drives three logical operations:
//! `findIntersection`, `nextBlock`, and `queryBlock` (for the metadata
//! endpoint). Responses are decoded into the neutral `chain` model so the
//! consumer never sees transport JSON.

use crate::chain::{Block, OutputReference, Point, Script, Transaction, TransactionOutput, Value};
use crate::consumer::producer::{BlockFetcher, ChainEvent, ChainProducer, ProducerError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value as Json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a single producer read may take before counting as a timeout.
const READ_TIMEOUT: Duration = Duration::from_secs(90);

/// WebSocket client for an Ogmios JSON-RPC bridge
pub struct OgmiosProducer {
    url: String,
    connection: Option<WsStream>,
}

impl OgmiosProducer {
    /// Create a client for the given bridge address.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            url: format!("ws://{}:{}", host, port),
            connection: None,
        }
    }

    async fn request(&mut self, method: &str, params: Json) -> Result<Json, ProducerError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ProducerError::Unreachable("not connected".into()))?;

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        connection
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| ProducerError::Unreachable(e.to_string()))?;

        loop {
            let frame = tokio::time::timeout(READ_TIMEOUT, connection.next())
                .await
                .map_err(|_| ProducerError::Timeout)?;
            match frame {
                Some(Ok(Message::Text(text))) => {
                    let response: Json = serde_json::from_str(&text)
                        .map_err(|e| ProducerError::Protocol(e.to_string()))?;
                    if let Some(error) = response.get("error") {
                        return Err(ProducerError::Protocol(error.to_string()));
                    }
                    return response
                        .get("result")
                        .cloned()
                        .ok_or_else(|| ProducerError::Protocol("response without result".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ProducerError::Unreachable(e.to_string())),
                None => return Err(ProducerError::Unreachable("connection closed".into())),
            }
        }
    }
}

#[async_trait]
impl ChainProducer for OgmiosProducer {
    async fn connect(&mut self) -> Result<(), ProducerError> {
        info!(target: "kupo::consumer", url = %self.url, "connecting to ogmios");
        let (stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| ProducerError::Unreachable(e.to_string()))?;
        self.connection = Some(stream);
        Ok(())
    }

    async fn find_intersection(
        &mut self,
        candidates: &[Point],
    ) -> Result<Option<Point>, ProducerError> {
        let points: Vec<Json> = candidates.iter().map(point_to_json).collect();
        let result = match self
            .request("findIntersection", json!({ "points": points }))
            .await
        {
            Ok(result) => result,
            // The bridge reports a missing intersection as a protocol-level
            // error; surface it as "no intersection" instead.
            Err(ProducerError::Protocol(message))
                if message.contains("IntersectionNotFound")
                    || message.contains("1000") =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match result.get("intersection") {
            Some(Json::Null) | None => Ok(None),
            Some(point) => Ok(Some(point_from_json(point)?)),
        }
    }

    async fn next_event(&mut self) -> Result<ChainEvent, ProducerError> {
        let result = self.request("nextBlock", json!({})).await?;
        let tip = result
            .get("tip")
            .map(point_from_json)
            .transpose()?
            .unwrap_or(Point::Origin);
        match result.get("direction").and_then(Json::as_str) {
            Some("forward") => {
                let block = result
                    .get("block")
                    .ok_or_else(|| ProducerError::Protocol("forward without block".into()))?;
                Ok(ChainEvent::RollForward {
                    block: block_from_json(block)?,
                    tip,
                })
            }
            Some("backward") => {
                let point = result
                    .get("point")
                    .ok_or_else(|| ProducerError::Protocol("backward without point".into()))?;
                Ok(ChainEvent::RollBackward {
                    point: point_from_json(point)?,
                    tip,
                })
            }
            direction => Err(ProducerError::Protocol(format!(
                "unknown direction: {:?}",
                direction
            ))),
        }
    }
}

/// Block fetcher opening one short-lived bridge session per request.
pub struct OgmiosBlockFetcher {
    host: String,
    port: u16,
}

impl OgmiosBlockFetcher {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

#[async_trait]
impl BlockFetcher for OgmiosBlockFetcher {
    async fn fetch_block(&self, point: &Point) -> Result<Option<Block>, ProducerError> {
        let mut client = OgmiosProducer::new(&self.host, self.port);
        client.connect().await?;
        let result = client
            .request("queryBlock", json!({ "point": point_to_json(point) }))
            .await?;
        debug!(target: "kupo::consumer", %point, "fetched block");
        match result.get("block") {
            Some(Json::Null) | None => Ok(None),
            Some(block) => Ok(Some(block_from_json(block)?)),
        }
    }
}

fn point_to_json(point: &Point) -> Json {
    match point {
        Point::Origin => json!("origin"),
        Point::At {
            slot_no,
            header_hash,
        } => json!({ "slot": slot_no, "id": header_hash }),
    }
}

fn point_from_json(value: &Json) -> Result<Point, ProducerError> {
    if value.as_str() == Some("origin") {
        return Ok(Point::Origin);
    }
    let slot_no = value
        .get("slot")
        .and_then(Json::as_u64)
        .ok_or_else(|| ProducerError::Protocol(format!("point without slot: {}", value)))?;
    let header_hash = value
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ProducerError::Protocol(format!("point without id: {}", value)))?;
    Ok(Point::at(slot_no, header_hash))
}

fn block_from_json(value: &Json) -> Result<Block, ProducerError> {
    let slot_no = value
        .get("slot")
        .and_then(Json::as_u64)
        .ok_or_else(|| ProducerError::Protocol("block without slot".into()))?;
    let header_hash = value
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ProducerError::Protocol("block without id".into()))?
        .to_string();
    let transactions = value
        .get("transactions")
        .and_then(Json::as_array)
        .map(|txs| txs.iter().map(transaction_from_json).collect::<Result<_, _>>())
        .transpose()?
        .unwrap_or_default();
    Ok(Block {
        slot_no,
        header_hash,
        transactions,
    })
}

fn transaction_from_json(value: &Json) -> Result<Transaction, ProducerError> {
    let id = value
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ProducerError::Protocol("transaction without id".into()))?
        .to_string();

    let mut transaction = Transaction {
        id,
        ..Transaction::default()
    };

    if let Some(inputs) = value.get("inputs").and_then(Json::as_array) {
        for input in inputs {
            let transaction_id = input
                .get("transaction")
                .and_then(|tx| tx.get("id"))
                .and_then(Json::as_str)
                .ok_or_else(|| ProducerError::Protocol("input without transaction id".into()))?;
            let output_index = input
                .get("index")
                .and_then(Json::as_u64)
                .ok_or_else(|| ProducerError::Protocol("input without index".into()))?;
            transaction.inputs.push(OutputReference {
                transaction_id: transaction_id.to_string(),
                output_index,
            });
        }
    }

    if let Some(outputs) = value.get("outputs").and_then(Json::as_array) {
        for output in outputs {
            transaction.outputs.push(output_from_json(output)?);
        }
    }

    // Inline datums ride along with their output.
    if let Some(outputs) = value.get("outputs").and_then(Json::as_array) {
        for output in outputs {
            if let (Some(hash), Some(datum)) = (
                output.get("datumHash").and_then(Json::as_str),
                output.get("datum").and_then(Json::as_str),
            ) {
                if let Ok(bytes) = hex::decode(datum) {
                    transaction.datums.insert(hash.to_string(), bytes);
                }
            }
        }
    }

    if let Some(datums) = value.get("datums").and_then(Json::as_object) {
        for (hash, datum) in datums {
            if let Some(bytes) = datum.as_str().and_then(|d| hex::decode(d).ok()) {
                transaction.datums.insert(hash.clone(), bytes);
            }
        }
    }

    if let Some(scripts) = value.get("scripts").and_then(Json::as_object) {
        for (hash, script) in scripts {
            let language = script
                .get("language")
                .and_then(Json::as_str)
                .unwrap_or("native")
                .to_string();
            let bytes = script
                .get("cbor")
                .and_then(Json::as_str)
                .and_then(|c| hex::decode(c).ok())
                .unwrap_or_default();
            transaction.scripts.insert(
                hash.clone(),
                Script {
                    bytes,
                    language,
                },
            );
        }
    }

    if let Some(metadata) = value
        .get("metadata")
        .and_then(|m| m.get("cbor"))
        .and_then(Json::as_str)
    {
        transaction.metadata = hex::decode(metadata).ok();
    }

    Ok(transaction)
}

fn output_from_json(value: &Json) -> Result<TransactionOutput, ProducerError> {
    let address = value
        .get("address")
        .and_then(Json::as_str)
        .ok_or_else(|| ProducerError::Protocol("output without address".into()))?
        .to_string();
    Ok(TransactionOutput {
        address,
        value: value_from_json(value.get("value"))?,
        datum_hash: value
            .get("datumHash")
            .and_then(Json::as_str)
            .map(str::to_string),
        script_hash: value
            .get("scriptHash")
            .and_then(Json::as_str)
            .map(str::to_string),
    })
}

fn value_from_json(value: Option<&Json>) -> Result<Value, ProducerError> {
    let Some(Json::Object(entries)) = value else {
        return Ok(Value::new(0));
    };
    let mut result = Value::new(0);
    for (policy, assets) in entries {
        if policy == "ada" {
            result.coins = assets
                .get("lovelace")
                .and_then(Json::as_u64)
                .unwrap_or_default();
            continue;
        }
        let Some(assets) = assets.as_object() else {
            continue;
        };
        for (asset_name, quantity) in assets {
            let quantity = quantity.as_u64().unwrap_or_default();
            result = result.with_asset(policy, asset_name, quantity);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_json_roundtrip() {
        let origin = point_from_json(&point_to_json(&Point::Origin)).unwrap();
        assert_eq!(origin, Point::Origin);

        let point = Point::at(42, "ab".repeat(32));
        let back = point_from_json(&point_to_json(&point)).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_block_decoding() {
        let block = json!({
            "id": "aa".repeat(32),
            "slot": 1234,
            "transactions": [{
                "id": "bb".repeat(32),
                "inputs": [{ "transaction": { "id": "cc".repeat(32) }, "index": 0 }],
                "outputs": [{
                    "address": "00aabb",
                    "value": {
                        "ada": { "lovelace": 2_000_000 },
                        "33333333333333333333333333333333333333333333333333333333": {
                            "abcd": 7
                        }
                    },
                    "datumHash": "dd".repeat(32),
                    "datum": "9f00ff"
                }],
                "metadata": { "cbor": "a100a0" }
            }]
        });
        let block = block_from_json(&block).unwrap();
        assert_eq!(block.slot_no, 1234);
        assert_eq!(block.transactions.len(), 1);
        let tx = &block.transactions[0];
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs[0].value.coins, 2_000_000);
        assert!(tx.outputs[0]
            .value
            .has_asset("33333333333333333333333333333333333333333333333333333333", "abcd"));
        assert_eq!(tx.datums.get(&"dd".repeat(32)), Some(&vec![0x9f, 0x00, 0xff]));
        assert_eq!(tx.metadata, Some(vec![0xa1, 0x00, 0xa0]));
    }

    #[test]
    fn test_missing_value_defaults_to_zero() {
        let output = json!({ "address": "00aabb" });
        let output = output_from_json(&output).unwrap();
        assert_eq!(output.value, Value::new(0));
    }
}
