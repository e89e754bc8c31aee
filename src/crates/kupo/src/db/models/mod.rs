//! Database models
//!
//! Row types for the five tables of the index. Slots are stored as SQLite
//! INTEGERs (i64) and converted at the chain boundary; hashes and
//! credentials are stored as lowercase hex TEXT.

pub mod binary_data;
pub mod checkpoint;
pub mod input;
pub mod pattern;
pub mod script;

pub use binary_data::BinaryData;
pub use checkpoint::Checkpoint;
pub use input::Input;
pub use pattern::PatternRow;
pub use script::ScriptRow;
