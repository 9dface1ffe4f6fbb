//! Store
//! -----
//! SQLite persistence behind a cheap cloneable handle. Every method issues
//! autocommit statements; the UNIQUE constraints in the schema arbitrate
//! concurrent writers, so lazy-creation paths retry their read instead of
//! holding a write transaction open.

pub mod models;

mod engagement;
mod media;
mod users;

pub use media::{DirectoryMetaPatch, FileMetaPatch};

use crate::error::AppResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the database. Clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database file and runs pending
    /// migrations.
    pub async fn open(db_path: impl AsRef<Path>) -> AppResult<Self> {
        let db_path = db_path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| crate::error::AppError::internal("migrate", e.to_string()))?;

        debug!(path = %db_path.display(), "database ready");
        Ok(Store { pool })
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        // A single connection held forever: every :memory: connection is its
        // own database, so the pool must never recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| crate::error::AppError::internal("migrate", e.to_string()))?;
        Ok(Store { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flushes and closes the pool. Call before process exit so WAL contents
    /// reach the main database file.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
