//! Fast, lightweight and configurable chain-index
//!
//! Kupo follows a chain from a chosen starting point, selects transaction
//! outputs through declarative patterns, and maintains a queryable,
//! rollback-safe materialization of those outputs with their datums,
//! scripts, and metadata, served over HTTP.
//!
//! The moving parts:
//!
//! - [`chain`]: points, addresses, values, patterns, blocks;
//! - [`db`]: the SQLite-backed storage engine and its arbitration;
//! - [`consumer`]: the chain-follower state machine (the long-lived writer);
//! - [`registry`]: the live pattern set;
//! - [`gc`]: periodic pruning;
//! - [`api`]: the HTTP request surface;
//! - [`health`]: aggregated observable state.

pub mod api;
pub mod chain;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod db;
pub mod gc;
pub mod health;
pub mod registry;
pub mod version;

pub use chain::{Pattern, Point};
pub use config::Config;
pub use db::Database;
pub use health::Health;
pub use registry::PatternRegistry;
