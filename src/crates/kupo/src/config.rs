//! Runtime configuration
//!
//! The resolved configuration the daemon actually runs with, validated from
//! the command line. Contradictory or missing startup inputs surface as
//! `ConfigError` values whose messages double as the `configurationError`
//! hints on stderr.

use crate::chain::{Pattern, Point};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default port of the HTTP server.
pub const DEFAULT_PORT: u16 = 1442;

/// Default interval between garbage collection passes, in seconds.
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 3600;

/// Default (and minimum) sizing of the HTTP task pool.
pub const DEFAULT_MAX_CONCURRENCY: u32 = 50;
pub const MIN_MAX_CONCURRENCY: u32 = 10;

/// Longest chain reorganization the index can undo, in slots.
pub const DEFAULT_LONGEST_ROLLBACK: u64 = 129_600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn hint(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

/// Where the index database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// On disk, under a working directory.
    Dir(PathBuf),
    /// Ephemeral, in memory.
    InMemory,
}

/// How the upstream block producer is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerConfig {
    /// JSON-RPC WebSocket bridge.
    Ogmios { host: String, port: u16 },
}

/// What happens to spent inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputManagementMode {
    /// Keep spent inputs forever, with a spent marker.
    MarkSpentInputs,
    /// Let the garbage collector remove inputs spent beyond the horizon.
    RemoveSpentInputs,
}

/// Fully-resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub producer: ProducerConfig,
    pub database: DatabaseLocation,
    pub host: IpAddr,
    pub port: u16,
    pub since: Option<Point>,
    pub patterns: Vec<Pattern>,
    pub input_management: InputManagementMode,
    pub gc_interval: Duration,
    pub max_concurrency: u32,
    pub defer_indexes: bool,
    pub longest_rollback: u64,
}

impl Config {
    /// Sanity-check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency < MIN_MAX_CONCURRENCY {
            return Err(ConfigError::hint(format!(
                "--max-concurrency must be at least {}",
                MIN_MAX_CONCURRENCY
            )));
        }
        if self.patterns.is_empty() && self.since.is_some() {
            return Err(ConfigError::hint(
                "--since without any --match pattern would index nothing; \
                 add at least one --match",
            ));
        }
        Ok(())
    }
}
