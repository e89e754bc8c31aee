//! Repository pattern implementations for database access
//!
//! One repository struct per table: inputs (with the pattern -> SQL
//! translator), checkpoints (with the ring coverage policy), patterns,
//! binary data, and scripts.

pub mod binary_data_repo;
pub mod checkpoint_repo;
pub mod input_repo;
pub mod pattern_repo;
pub mod script_repo;

pub use binary_data_repo::BinaryDataRepository;
pub use checkpoint_repo::CheckpointRepository;
pub use input_repo::{InputRepository, MatchQuery, PreparedQuery, SortDirection, StatusFlag};
pub use pattern_repo::PatternRepository;
pub use script_repo::ScriptRepository;
