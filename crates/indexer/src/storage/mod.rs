//! Storage layer for the rollscan indexer.
//!
//! This module provides database operations for:
//! - Blocks (height-keyed, insert-if-absent)
//! - Transactions and account links (sequence-numbered)
//! - Sequence counters
//! - NFT collections and tokens
//! - Move fungible-asset stores and EVM receipts
//!
//! Write helpers take a `&mut SqliteConnection` so the collector can run
//! every submodule inside one transaction. Read helpers hang off [`Storage`].

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod block;
pub mod fa_store;
pub mod nft;
pub mod seq;
pub mod tx;
pub mod types;

pub use types::*;

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://rollscan.db")
    /// * `max_connections` - Pool ceiling (default 5)
    /// * `min_connections` - Pool floor (default 1)
    ///
    /// # Example
    /// ```no_run
    /// # use rollscan_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://rollscan.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, None, None).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

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

    /// Highest committed height for `chain_id`, if any block was committed.
    pub async fn last_committed_height(&self, chain_id: &str) -> Result<Option<i64>> {
        let height: Option<i64> =
            sqlx::query_scalar("SELECT MAX(height) FROM blocks WHERE chain_id = ?")
                .bind(chain_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to fetch last committed height")?;

        Ok(height)
    }

    /// Get database statistics for one chain.
    pub async fn stats(&self, chain_id: &str) -> Result<DatabaseStats> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            let chain_id = chain_id.to_string();
            async move {
                let sql = format!("SELECT COUNT(*) FROM {} WHERE chain_id = ?", table);
                sqlx::query_scalar::<_, i64>(&sql)
                    .bind(chain_id)
                    .fetch_one(&pool)
                    .await
                    .with_context(|| format!("Failed to count {}", table))
            }
        };

        let block_count = count("blocks").await?;
        let tx_count = count("txs").await?;
        let account_tx_count = count("account_txs").await?;
        let collection_count = count("nft_collections").await?;
        let nft_count = count("nfts").await?;

        Ok(DatabaseStats {
            block_count: block_count as u64,
            tx_count: tx_count as u64,
            account_tx_count: account_tx_count as u64,
            collection_count: collection_count as u64,
            nft_count: nft_count as u64,
            last_height: self.last_committed_height(chain_id).await?,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of committed blocks
    pub block_count: u64,

    /// Total number of transactions
    pub tx_count: u64,

    /// Total number of account/transaction links
    pub account_tx_count: u64,

    /// Total number of NFT collections
    pub collection_count: u64,

    /// Total number of live NFTs
    pub nft_count: u64,

    /// Last committed height
    pub last_height: Option<i64>,
}
