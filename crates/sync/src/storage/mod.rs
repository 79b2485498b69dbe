//! Storage layer for the synchronizer.
//!
//! This module provides database operations for:
//! - The sync cursor (processed-block tracking)
//! - Ledger transaction records (idempotency keys + opaque payloads)
//! - Inventory projections
//! - The audit trail

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::Result;

pub mod audit;
pub mod cursor;
pub mod inventory;
pub mod ledger;
pub mod types;
pub mod writer;

pub use types::*;
pub use writer::ApplyReport;

/// Database storage for the synchronizer.
///
/// Provides async access to SQLite with connection pooling. Cloning is
/// cheap; all clones share the pool.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// Creates the database file if it doesn't exist. Pool bounds default
    /// to 5/1 when not supplied.
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create a new storage instance from a filesystem path.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, None, None).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let ledger_record_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_tx_records")
                .fetch_one(&self.pool)
                .await?;

        let inventory_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items")
            .fetch_one(&self.pool)
            .await?;

        let audit_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;

        let cursor = self.get_cursor().await?;

        Ok(DatabaseStats {
            ledger_record_count: ledger_record_count as u64,
            inventory_count: inventory_count as u64,
            audit_count: audit_count as u64,
            last_processed_block: cursor.last_processed_block,
        })
    }
}
