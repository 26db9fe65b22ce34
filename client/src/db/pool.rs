//! Local store connection management.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Duration;

/// How long a connection waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the local durable store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pub(crate) pool: SqlitePool,
}

impl LocalStore {
    /// Open (creating if needed) the store at `database_url` and migrate it.
    ///
    /// The file runs in WAL mode so readers never block the writer, and
    /// writers wait out each other's locks instead of failing.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Local store opened: {}", database_url);
        Self::init(pool).await
    }

    /// A private in-memory store.
    ///
    /// Limited to one connection that never expires, since each SQLite
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // Every caller queues for the one connection
            .acquire_timeout(Duration::from_secs(600))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self { pool };
        let recovered = store.recover_interrupted().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "Reset interrupted queue entries to pending");
        }
        Ok(store)
    }

    /// Start a transaction that takes the write lock up front.
    ///
    /// A deferred transaction that reads before it writes cannot wait for
    /// the lock once another connection has written, so every
    /// read-then-write transaction goes through here.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
