//! Block storage operations.

use super::{BlockRecord, Storage};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Insert a block row unless one already exists for `(chain_id, height)`.
pub async fn insert_block(conn: &mut SqliteConnection, block: &BlockRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO blocks (
            chain_id, height, hash, timestamp, block_time, proposer,
            total_fee, tx_count, gas_used, gas_wanted
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, height) DO NOTHING
        "#,
    )
    .bind(&block.chain_id)
    .bind(block.height)
    .bind(&block.hash)
    .bind(block.timestamp)
    .bind(block.block_time)
    .bind(&block.proposer)
    .bind(&block.total_fee)
    .bind(block.tx_count)
    .bind(block.gas_used)
    .bind(block.gas_wanted)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert block {}", block.height))?;

    Ok(())
}

/// Timestamp (unix millis) of the block at `height`, if stored.
pub async fn block_timestamp(
    conn: &mut SqliteConnection,
    chain_id: &str,
    height: i64,
) -> Result<Option<i64>> {
    sqlx::query_scalar("SELECT timestamp FROM blocks WHERE chain_id = ? AND height = ?")
        .bind(chain_id)
        .bind(height)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("Failed to fetch timestamp of block {}", height))
}

fn block_from_row(row: &SqliteRow) -> BlockRecord {
    BlockRecord {
        chain_id: row.get("chain_id"),
        height: row.get("height"),
        hash: row.get("hash"),
        timestamp: row.get("timestamp"),
        block_time: row.get("block_time"),
        proposer: row.get("proposer"),
        total_fee: row.get("total_fee"),
        tx_count: row.get("tx_count"),
        gas_used: row.get("gas_used"),
        gas_wanted: row.get("gas_wanted"),
    }
}

impl Storage {
    /// Get a block by height.
    pub async fn get_block(&self, chain_id: &str, height: i64) -> Result<Option<BlockRecord>> {
        let row = sqlx::query(
            r#"
            SELECT chain_id, height, hash, timestamp, block_time, proposer,
                   total_fee, tx_count, gas_used, gas_wanted
            FROM blocks
            WHERE chain_id = ? AND height = ?
            "#,
        )
        .bind(chain_id)
        .bind(height)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch block")?;

        Ok(row.as_ref().map(block_from_row))
    }

    /// Committed heights in ascending order.
    pub async fn committed_heights(&self, chain_id: &str) -> Result<Vec<i64>> {
        sqlx::query_scalar("SELECT height FROM blocks WHERE chain_id = ? ORDER BY height ASC")
            .bind(chain_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch committed heights")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::setup_storage;

    fn sample_block(height: i64, hash: &str) -> BlockRecord {
        BlockRecord {
            chain_id: "rollup-1".to_string(),
            height,
            hash: hash.to_string(),
            timestamp: 1_700_000_000_000 + height * 500,
            block_time: Some(500),
            proposer: "initvaloper1xyz".to_string(),
            total_fee: "[]".to_string(),
            tx_count: 0,
            gas_used: 0,
            gas_wanted: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_block() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        insert_block(&mut conn, &sample_block(10, "AA")).await.unwrap();

        let block = storage.get_block("rollup-1", 10).await.unwrap().unwrap();
        assert_eq!(block.hash, "AA");
        assert_eq!(block.block_time, Some(500));
        assert_eq!(storage.last_committed_height("rollup-1").await.unwrap(), Some(10));
        assert!(storage.get_block("rollup-2", 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_block_keeps_first_write() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        insert_block(&mut conn, &sample_block(10, "AA")).await.unwrap();
        insert_block(&mut conn, &sample_block(10, "BB")).await.unwrap();

        let block = storage.get_block("rollup-1", 10).await.unwrap().unwrap();
        assert_eq!(block.hash, "AA");
    }

    #[tokio::test]
    async fn test_block_timestamp_lookup() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        insert_block(&mut conn, &sample_block(7, "AA")).await.unwrap();

        let ts = block_timestamp(&mut conn, "rollup-1", 7).await.unwrap();
        assert_eq!(ts, Some(1_700_000_003_500));
        assert_eq!(block_timestamp(&mut conn, "rollup-1", 6).await.unwrap(), None);
    }
}
