//! Client episode store for the exitcast pipeline.
//!
//! This crate is the only place that talks SQL. Every stage opens one
//! [`ClientStore`] session for its batch, uses it, and closes it.
//!
//! # Backend selection
//!
//! The backend is chosen at compile time:
//!
//! - `postgres` feature: `PgPool` (production)
//! - `sqlite` feature (default): `SqlitePool` (local runs and the test suite)
//!
//! If both features are enabled, `postgres` takes priority. All statements use
//! `$N` placeholders, which both backends accept.
//!
//! # Usage
//!
//! ```rust,ignore
//! use exitcast_db::{ClientStore, StoreConfig};
//!
//! let store = ClientStore::connect(StoreConfig::new(url, "guests")).await?;
//! let batch = store.fetch_open_episodes().await?;
//! store.close().await;
//! ```

mod episodes;
mod error;
pub mod ident;
mod pii;
mod predictions;

pub use error::{DbError, Result};
pub use ident::TableName;
pub use pii::{SsnRewrite, SsnRow};
pub use predictions::PredictionWrite;

use std::time::Duration;
use tracing::info;

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("exitcast_db requires the `sqlite` or `postgres` feature");

/// The compiled-in database driver.
#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type Db = sqlx::Sqlite;

/// Database pool type alias.
pub type DbPool = sqlx::Pool<Db>;

/// Database row type for queries.
pub type DbRow = <Db as sqlx::Database>::Row;

/// Name of the compiled-in backend, for logs.
#[cfg(feature = "postgres")]
pub const BACKEND: &str = "postgres";

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub const BACKEND: &str = "sqlite";

/// Store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database connection URL (credentials included)
    pub url: String,
    /// Episode table name
    pub table: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
    /// How long to wait for a connection before giving up
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            table: table.into(),
            max_connections: 2,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// In-memory SQLite configuration (for testing).
    ///
    /// A single connection that never idles out, since every connection to
    /// `sqlite::memory:` is its own database.
    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    pub fn sqlite_memory(table: impl Into<String>) -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            table: table.into(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// A session against the client episode table, scoped to one batch invocation.
#[derive(Clone)]
pub struct ClientStore {
    pool: DbPool,
    table: TableName,
}

impl ClientStore {
    /// Connect to the store.
    ///
    /// Fails with [`DbError::Connectivity`] when the store cannot be reached.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let table = TableName::parse(&config.table)?;

        let pool = sqlx::pool::PoolOptions::<Db>::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&config.url)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::Query(inner) => DbError::Connectivity(inner),
                other => other,
            })?;

        info!(backend = BACKEND, table = %table, "Connected to client store");

        Ok(Self { pool, table })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: DbPool, table: &str) -> Result<Self> {
        Ok(Self {
            pool,
            table: TableName::parse(table)?,
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Get the underlying connection pool (escape hatch for fixtures and tests).
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Close the session, releasing every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
