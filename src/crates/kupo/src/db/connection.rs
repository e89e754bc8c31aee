//! Database connection management
//!
//! Owns the SQLite pool, the migration runner, and the reader/writer
//! arbitration between the one long-lived writer (the chain consumer and the
//! garbage collector, serialized against each other) and the many
//! short-lived HTTP-side sessions.
//!
//! The arbitration discipline, verbatim:
//!
//! - short-lived: increment `readers`, wait until `writer == false`, proceed;
//!   decrement on release;
//! - long-lived: wait until `readers == 0` and no other long-lived holder,
//!   set `writer = true`, proceed; clear on release.
//!
//! Readers never starve each other, and the writer advances whenever no
//! short-lived session is mid-transaction. Short-lived sessions may write;
//! they open IMMEDIATE transactions and retry the engine's BUSY status with
//! a fixed 100 ms backoff, unbounded.

use crate::db::error::{DatabaseError, DbResult};
use parking_lot::Mutex;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Name of the database file inside the working directory.
pub const DATABASE_FILENAME: &str = "kupo.sqlite3";

/// Fixed backoff applied when the engine reports BUSY.
pub const BUSY_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct ArbitratorState {
    readers: usize,
    writer: bool,
}

/// Process-wide reader/writer arbitration.
#[derive(Debug, Default)]
pub struct ConnectionArbitrator {
    state: Mutex<ArbitratorState>,
    notify: Notify,
}

impl ConnectionArbitrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire a short-lived (reader-side) permit.
    ///
    /// The reader is counted before it waits, so a long-lived writer cannot
    /// re-acquire while anyone is queued. Cancellation-safe: the count is
    /// released by the permit even if the wait is abandoned.
    pub async fn acquire_reader(self: &Arc<Self>) -> ReaderPermit {
        self.state.lock().readers += 1;
        let permit = ReaderPermit {
            arbitrator: self.clone(),
        };
        let notified = self.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            if !self.state.lock().writer {
                return permit;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// Acquire the long-lived writer permit.
    pub async fn acquire_writer(self: &Arc<Self>) -> WriterPermit {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.readers == 0 && !state.writer {
                    state.writer = true;
                    return WriterPermit {
                        arbitrator: self.clone(),
                    };
                }
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// Current `(readers, writer)` counters.
    pub fn counters(&self) -> (usize, bool) {
        let state = self.state.lock();
        (state.readers, state.writer)
    }
}

/// Held by a short-lived session for the duration of its transaction.
#[derive(Debug)]
pub struct ReaderPermit {
    arbitrator: Arc<ConnectionArbitrator>,
}

impl Drop for ReaderPermit {
    fn drop(&mut self) {
        {
            let mut state = self.arbitrator.state.lock();
            state.readers = state.readers.saturating_sub(1);
        }
        self.arbitrator.notify.notify_waiters();
    }
}

/// Held by the long-lived writer for the duration of its transaction.
#[derive(Debug)]
pub struct WriterPermit {
    arbitrator: Arc<ConnectionArbitrator>,
}

impl Drop for WriterPermit {
    fn drop(&mut self) {
        self.arbitrator.state.lock().writer = false;
        self.arbitrator.notify.notify_waiters();
    }
}

#[derive(Debug)]
enum Permit {
    Reader(#[allow(dead_code)] ReaderPermit),
    Writer(#[allow(dead_code)] WriterPermit),
}

/// An open transaction bound to a pool connection and an arbitration permit.
///
/// Commit rolls back on failure so the caller can retry cleanly; dropping an
/// unfinished transaction rolls it back in the background.
#[derive(Debug)]
pub struct DbTransaction {
    inner: Option<(PoolConnection<Sqlite>, Permit)>,
    retry_busy: bool,
}

impl DbTransaction {
    /// The connection this transaction runs on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self
            .inner
            .as_mut()
            .expect("transaction used after commit or rollback")
            .0
    }

    /// Commit the transaction.
    pub async fn commit(mut self) -> DbResult<()> {
        let Some((mut conn, permit)) = self.inner.take() else {
            return Err(DatabaseError::Transaction(
                "transaction already finished".into(),
            ));
        };
        loop {
            match sqlx::query("COMMIT").execute(&mut *conn).await {
                Ok(_) => break,
                Err(err) => {
                    let err = DatabaseError::from(err);
                    if self.retry_busy && err.is_busy() {
                        tokio::time::sleep(BUSY_RETRY_DELAY).await;
                        continue;
                    }
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    drop(permit);
                    return Err(err);
                }
            }
        }
        drop(permit);
        Ok(())
    }

    /// Roll the transaction back explicitly.
    pub async fn rollback(mut self) -> DbResult<()> {
        let Some((mut conn, permit)) = self.inner.take() else {
            return Err(DatabaseError::Transaction(
                "transaction already finished".into(),
            ));
        };
        let result = sqlx::query("ROLLBACK").execute(&mut *conn).await;
        drop(permit);
        result.map(|_| ()).map_err(DatabaseError::from)
    }
}

impl Drop for DbTransaction {
    fn drop(&mut self) {
        if let Some((mut conn, permit)) = self.inner.take() {
            tokio::spawn(async move {
                if let Err(err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(target: "kupo::db", "failed to roll back abandoned transaction: {}", err);
                }
                drop(permit);
            });
        }
    }
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    arbitrator: Arc<ConnectionArbitrator>,
}

impl Database {
    /// Open (creating if missing) the database file under the working
    /// directory, in WAL mode, with a pool sized for the HTTP concurrency.
    pub async fn open(workdir: &Path, max_connections: u32) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(workdir.join(DATABASE_FILENAME))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            arbitrator: ConnectionArbitrator::new(),
        })
    }

    /// Open an in-memory database.
    ///
    /// Exactly one connection is retained and handed around: every pooled
    /// connection would otherwise see its own private memory database.
    pub async fn in_memory() -> DbResult<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            arbitrator: ConnectionArbitrator::new(),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// The shared arbitration counters.
    pub fn arbitrator(&self) -> Arc<ConnectionArbitrator> {
        self.arbitrator.clone()
    }

    /// Run migrations on the database
    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))
    }

    /// Install the secondary lookup indexes.
    ///
    /// Kept out of the migrations so a first synchronization can defer them
    /// and install on the next start.
    pub async fn install_indexes(&self) -> DbResult<()> {
        const INDEXES: &[&str] = &[
            "CREATE INDEX IF NOT EXISTS inputs_address ON inputs(address)",
            "CREATE INDEX IF NOT EXISTS inputs_payment_credential ON inputs(payment_credential)",
            "CREATE INDEX IF NOT EXISTS inputs_delegation_credential ON inputs(delegation_credential)",
            "CREATE INDEX IF NOT EXISTS inputs_created_at_slot ON inputs(created_at_slot)",
            "CREATE INDEX IF NOT EXISTS inputs_spent_at_slot ON inputs(spent_at_slot)",
            "CREATE INDEX IF NOT EXISTS inputs_datum_hash ON inputs(datum_hash)",
            "CREATE INDEX IF NOT EXISTS inputs_script_hash ON inputs(script_hash)",
            "CREATE INDEX IF NOT EXISTS policies_policy_id ON policies(policy_id)",
        ];
        for sql in INDEXES {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn begin_with(&self, begin: &str, permit: Permit, retry_busy: bool) -> DbResult<DbTransaction> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        loop {
            match sqlx::query(begin).execute(&mut *conn).await {
                Ok(_) => break,
                Err(err) => {
                    let err = DatabaseError::from(err);
                    if retry_busy && err.is_busy() {
                        tokio::time::sleep(BUSY_RETRY_DELAY).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Ok(DbTransaction {
            inner: Some((conn, permit)),
            retry_busy,
        })
    }

    /// Begin a short-lived, read-only (deferred) transaction.
    pub async fn begin_read(&self) -> DbResult<DbTransaction> {
        let permit = Permit::Reader(self.arbitrator.acquire_reader().await);
        self.begin_with("BEGIN DEFERRED", permit, false).await
    }

    /// Begin a short-lived read/write (immediate) transaction.
    pub async fn begin_write(&self) -> DbResult<DbTransaction> {
        let permit = Permit::Reader(self.arbitrator.acquire_reader().await);
        self.begin_with("BEGIN IMMEDIATE", permit, true).await
    }

    /// Begin a long-lived writer (immediate) transaction.
    pub async fn begin_exclusive(&self) -> DbResult<DbTransaction> {
        let permit = Permit::Writer(self.arbitrator.acquire_writer().await);
        self.begin_with("BEGIN IMMEDIATE", permit, true).await
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
