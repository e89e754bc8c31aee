//! Chain data model
//!
//! Points, addresses, values, patterns, and blocks: the vocabulary shared by
//! the consumer, the storage engine, and the HTTP surface.

pub mod address;
pub mod block;
pub mod pattern;
pub mod point;
pub mod value;

pub use block::{Block, OutputReference, Script, Transaction, TransactionOutput};
pub use pattern::{Candidate, InvalidPattern, Pattern};
pub use point::{MalformedPoint, Point, Slot};
pub use value::Value;
