//! `SQLite` connection pool setup and migration runner.

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::analytics::SqliteAnalyticsSink;
use crate::automation_repo::SqliteAutomationRepository;
use crate::contact_store::SqliteContactStore;
use crate::error::StorageError;
use crate::job_store::SqliteJobStore;

/// Configuration for the `SQLite` storage adapter.
pub struct Config {
    /// `SQLite` connection URL (e.g. `sqlite:convoflow.db` or `sqlite::memory:`).
    pub database_url: String,
}

impl Config {
    /// Read configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `CONVOFLOW_DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self {
            database_url: std::env::var("CONVOFLOW_DATABASE_URL")?,
        })
    }

    /// Build a [`Database`] from this configuration.
    ///
    /// Creates the connection pool, creates the database file if missing,
    /// and runs all pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the connection or migrations fail.
    pub async fn build(self) -> Result<Database, StorageError> {
        Database::initialize(&self.database_url).await
    }
}

/// Holds the `SQLite` connection pool and hands out the repositories.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn initialize(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(database_url, "database ready");

        Ok(Self { pool })
    }

    /// Borrow the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn automations(&self) -> SqliteAutomationRepository {
        SqliteAutomationRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn contacts(&self) -> SqliteContactStore {
        SqliteContactStore::new(self.pool.clone())
    }

    #[must_use]
    pub fn jobs(&self) -> SqliteJobStore {
        SqliteJobStore::new(self.pool.clone())
    }

    #[must_use]
    pub fn analytics(&self) -> SqliteAnalyticsSink {
        SqliteAnalyticsSink::new(self.pool.clone())
    }
}

#[cfg(test)]
pub(crate) async fn memory() -> Database {
    Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .unwrap()
}
