//! Health state and metrics
//!
//! Aggregates observable state from the consumer (connection status, node
//! tip) and the storage engine (most recent checkpoint) into one shared
//! handle, rendered either as JSON or as Prometheus exposition text.

use crate::chain::Point;
use crate::config::InputManagementMode;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Connection state towards the block producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Static configuration echoed in health reports.
#[derive(Debug, Clone, Serialize)]
pub struct HealthConfiguration {
    pub input_management: InputManagementMode,
    /// `installed` or `deferred`.
    pub indexes: &'static str,
}

/// JSON shape of a health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub connection_status: ConnectionStatus,
    pub most_recent_checkpoint: Option<PointReport>,
    pub most_recent_node_tip: Option<PointReport>,
    pub configuration: HealthConfiguration,
}

/// A point rendered as its slot and hash parts.
#[derive(Debug, Clone, Serialize)]
pub struct PointReport {
    pub slot_no: u64,
    pub header_hash: String,
}

impl PointReport {
    fn from_point(point: &Point) -> Option<Self> {
        Some(Self {
            slot_no: point.slot_no()?,
            header_hash: point.header_hash()?.to_string(),
        })
    }
}

#[derive(Debug)]
struct HealthInner {
    connection: AtomicU8,
    most_recent_checkpoint: Mutex<Option<Point>>,
    most_recent_node_tip: Mutex<Option<Point>>,
    configuration: HealthConfiguration,
}

/// Shared, cheaply-clonable health handle.
#[derive(Debug, Clone)]
pub struct Health {
    inner: Arc<HealthInner>,
}

const CONNECTED: u8 = 1;
const DISCONNECTED: u8 = 0;

impl Health {
    pub fn new(input_management: InputManagementMode, indexes_deferred: bool) -> Self {
        Self {
            inner: Arc::new(HealthInner {
                connection: AtomicU8::new(DISCONNECTED),
                most_recent_checkpoint: Mutex::new(None),
                most_recent_node_tip: Mutex::new(None),
                configuration: HealthConfiguration {
                    input_management,
                    indexes: if indexes_deferred { "deferred" } else { "installed" },
                },
            }),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let status = if connected { CONNECTED } else { DISCONNECTED };
        self.inner.connection.store(status, Ordering::Relaxed);
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        if self.inner.connection.load(Ordering::Relaxed) == CONNECTED {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    pub fn set_checkpoint(&self, point: Point) {
        *self.inner.most_recent_checkpoint.lock() = Some(point);
    }

    pub fn clear_checkpoint(&self) {
        *self.inner.most_recent_checkpoint.lock() = None;
    }

    pub fn most_recent_checkpoint(&self) -> Option<Point> {
        self.inner.most_recent_checkpoint.lock().clone()
    }

    pub fn set_node_tip(&self, point: Point) {
        *self.inner.most_recent_node_tip.lock() = Some(point);
    }

    pub fn most_recent_node_tip(&self) -> Option<Point> {
        self.inner.most_recent_node_tip.lock().clone()
    }

    /// Assemble a point-in-time report.
    pub fn report(&self) -> HealthReport {
        HealthReport {
            connection_status: self.connection_status(),
            most_recent_checkpoint: self
                .most_recent_checkpoint()
                .as_ref()
                .and_then(PointReport::from_point),
            most_recent_node_tip: self
                .most_recent_node_tip()
                .as_ref()
                .and_then(PointReport::from_point),
            configuration: self.inner.configuration.clone(),
        }
    }

    /// Render the Prometheus exposition format.
    pub fn prometheus(&self) -> String {
        let report = self.report();
        let mut out = String::new();
        out.push_str("# TYPE kupo_connection_status gauge\n");
        out.push_str(&format!(
            "kupo_connection_status {}\n",
            match report.connection_status {
                ConnectionStatus::Connected => 1,
                ConnectionStatus::Disconnected => 0,
            }
        ));
        if let Some(checkpoint) = &report.most_recent_checkpoint {
            out.push_str("# TYPE kupo_most_recent_checkpoint gauge\n");
            out.push_str(&format!(
                "kupo_most_recent_checkpoint {}\n",
                checkpoint.slot_no
            ));
        }
        if let Some(tip) = &report.most_recent_node_tip {
            out.push_str("# TYPE kupo_most_recent_node_tip gauge\n");
            out.push_str(&format!("kupo_most_recent_node_tip {}\n", tip.slot_no));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health() -> Health {
        Health::new(InputManagementMode::MarkSpentInputs, false)
    }

    #[test]
    fn test_starts_disconnected() {
        let health = health();
        assert_eq!(health.connection_status(), ConnectionStatus::Disconnected);
        assert!(health.report().most_recent_checkpoint.is_none());
    }

    #[test]
    fn test_checkpoint_updates() {
        let health = health();
        health.set_checkpoint(Point::at(42, "ab".repeat(32)));
        let report = health.report();
        assert_eq!(report.most_recent_checkpoint.unwrap().slot_no, 42);
    }

    #[test]
    fn test_prometheus_rendering() {
        let health = health();
        health.set_connected(true);
        health.set_checkpoint(Point::at(42, "ab".repeat(32)));
        let text = health.prometheus();
        assert!(text.contains("kupo_connection_status 1"));
        assert!(text.contains("kupo_most_recent_checkpoint 42"));
        assert!(!text.contains("kupo_most_recent_node_tip"));
    }

    #[test]
    fn test_json_shape() {
        let health = health();
        health.set_connected(true);
        let json = serde_json::to_value(health.report()).unwrap();
        assert_eq!(json["connection_status"], "connected");
        assert_eq!(json["most_recent_checkpoint"], serde_json::Value::Null);
        assert_eq!(json["configuration"]["input_management"], "mark_spent_inputs");
    }
}
