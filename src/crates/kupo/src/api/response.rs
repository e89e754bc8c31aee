//! API response helpers
//!
//! Streaming responses are newline-delimited JSON pushed through a bounded
//! channel: the handler spawns a producer task that yields one document at a
//! time, and the connection pulls at its own pace. Large result sets never
//! materialize in memory, and a slow client applies backpressure all the way
//! into the row cursor.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Content type of newline-delimited JSON streams.
pub const NDJSON: &str = "application/x-ndjson";

/// How many documents may sit in flight between producer and connection.
const STREAM_BUFFER: usize = 64;

/// Producer half of a streaming response.
pub struct JsonLines {
    tx: mpsc::Sender<Result<String, std::io::Error>>,
}

impl JsonLines {
    /// Yield one document. Returns `false` when the client went away; the
    /// producer should stop.
    pub async fn send<T: Serialize>(&self, document: &T) -> bool {
        let line = match serde_json::to_string(document) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(err) => {
                tracing::error!(target: "kupo::api", "failed to serialize document: {}", err);
                return false;
            }
        };
        self.tx.send(Ok(line)).await.is_ok()
    }

    /// Abort the stream mid-flight. The client sees a truncated body.
    pub async fn abort(&self, message: &str) {
        let _ = self
            .tx
            .send(Err(std::io::Error::other(message.to_string())))
            .await;
    }
}

/// Create a newline-delimited JSON streaming response and its producer half.
pub fn json_lines() -> (JsonLines, Response) {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let body = Body::from_stream(ReceiverStream::new(rx));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON)
        .body(body)
        .unwrap_or_default();
    (JsonLines { tx }, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_lines_are_newline_delimited() {
        let (lines, response) = json_lines();
        assert!(lines.send(&serde_json::json!({"a": 1})).await);
        assert!(lines.send(&serde_json::json!({"b": 2})).await);
        drop(lines);

        let mut body = response.into_body().into_data_stream();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(collected).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":2}\n");
    }

    #[tokio::test]
    async fn test_send_after_client_disconnect_reports_closed() {
        let (lines, response) = json_lines();
        drop(response);
        assert!(!lines.send(&serde_json::json!({"a": 1})).await);
    }
}
