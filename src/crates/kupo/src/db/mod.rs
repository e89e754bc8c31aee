//! Storage engine
//!
//! Schema, migrations, transactions, reader/writer arbitration, and the
//! repositories over the five tables of the index.

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{
    ConnectionArbitrator, Database, DatabasePool, DbTransaction, ReaderPermit, WriterPermit,
    BUSY_RETRY_DELAY, DATABASE_FILENAME,
};
pub use error::{DatabaseError, DbResult};
