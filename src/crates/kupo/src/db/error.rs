//! Database error types and handling
//!
//! Splits storage failures into the transient class (busy, retried with a
//! fixed backoff) and the fatal class (corruption, unexpected rows, failed
//! migrations) which aborts the affected task with a diagnostic.

use thiserror::Error;

/// Custom database error type
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The engine reported BUSY or LOCKED; callers retry with a fixed backoff.
    #[error("database is busy")]
    Busy,

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// The on-disk database is damaged.
    #[error("database corruption detected: {0}")]
    Corruption(String),

    /// A row failed to decode into its model.
    #[error("unexpected row: {0}")]
    UnexpectedRow(String),

    /// Migration error
    #[error("migration failed: {0}")]
    Migration(String),

    /// Connection or pool error
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Transaction protocol error
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Generic database error
    #[error("database error: {0}")]
    Other(String),
}

impl DatabaseError {
    /// Whether this error is transient and worth retrying.
    pub fn is_busy(&self) -> bool {
        matches!(self, DatabaseError::Busy)
    }

    /// Whether this error should abort the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DatabaseError::Corruption(_)
                | DatabaseError::UnexpectedRow(_)
                | DatabaseError::Migration(_)
        )
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }
}

/// Result type for database operations
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

// SQLite primary result codes surfaced through sqlx as stringified numbers.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_CORRUPT: &str = "11";
const SQLITE_NOTADB: &str = "26";

/// Convert sqlx::Error to DatabaseError
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => DatabaseError::Busy,
                    Some(SQLITE_CORRUPT) | Some(SQLITE_NOTADB) => {
                        DatabaseError::Corruption(db_err.to_string())
                    }
                    _ if db_err.message().contains("database is locked") => DatabaseError::Busy,
                    _ => DatabaseError::Other(db_err.to_string()),
                }
            }
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound("no matching row found in database".to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                DatabaseError::UnexpectedRow(format!("column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DatabaseError::UnexpectedRow(
                format!("column index out of bounds: {} >= {}", index, len),
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DatabaseError::UnexpectedRow(format!("error decoding column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                DatabaseError::UnexpectedRow(format!("decode error: {}", source))
            }
            sqlx::Error::Configuration(msg) => {
                DatabaseError::Connection(format!("configuration error: {}", msg))
            }
            sqlx::Error::Io(err) => DatabaseError::Connection(format!("io error: {}", err)),
            sqlx::Error::PoolTimedOut => {
                DatabaseError::Connection("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                DatabaseError::Connection("connection pool is closed".to_string())
            }
            sqlx::Error::Migrate(err) => DatabaseError::Migration(err.to_string()),
            err => DatabaseError::Other(err.to_string()),
        }
    }
}
