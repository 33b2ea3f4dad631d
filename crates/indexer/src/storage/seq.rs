//! Sequence counters.
//!
//! Counters only move inside the collector's transaction, so a rolled-back
//! block never burns sequence numbers.

use anyhow::{Context, Result};
use sqlx::SqliteConnection;

/// Current value of counter `name`, 0 if it was never incremented.
pub async fn current(conn: &mut SqliteConnection, chain_id: &str, name: &str) -> Result<i64> {
    let value: Option<i64> =
        sqlx::query_scalar("SELECT sequence FROM seq_info WHERE chain_id = ? AND name = ?")
            .bind(chain_id)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("Failed to read sequence {}", name))?;

    Ok(value.unwrap_or(0))
}

/// Reserve `count` consecutive values of counter `name`.
///
/// Returns the first reserved value; the range is `first..first + count`.
/// Reserving zero values leaves the counter untouched.
pub async fn allocate(
    conn: &mut SqliteConnection,
    chain_id: &str,
    name: &str,
    count: usize,
) -> Result<i64> {
    let current = current(conn, chain_id, name).await?;
    if count == 0 {
        return Ok(current + 1);
    }

    let next = current + count as i64;
    sqlx::query(
        r#"
        INSERT INTO seq_info (chain_id, name, sequence)
        VALUES (?, ?, ?)
        ON CONFLICT(chain_id, name) DO UPDATE SET
            sequence = excluded.sequence
        "#,
    )
    .bind(chain_id)
    .bind(name)
    .bind(next)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to advance sequence {}", name))?;

    Ok(current + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::setup_storage;

    #[tokio::test]
    async fn test_allocate_is_contiguous() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        assert_eq!(allocate(&mut conn, "c", "tx", 3).await.unwrap(), 1);
        assert_eq!(allocate(&mut conn, "c", "tx", 2).await.unwrap(), 4);
        assert_eq!(current(&mut conn, "c", "tx").await.unwrap(), 5);

        // Counters are per chain and per name.
        assert_eq!(allocate(&mut conn, "c", "account_tx", 1).await.unwrap(), 1);
        assert_eq!(allocate(&mut conn, "other", "tx", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_allocate_zero_is_noop() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        allocate(&mut conn, "c", "tx", 0).await.unwrap();
        assert_eq!(current(&mut conn, "c", "tx").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_allocate_rolls_back_with_transaction() {
        let (storage, _temp_db) = setup_storage().await;

        let mut tx = storage.pool().begin().await.unwrap();
        allocate(&mut tx, "c", "tx", 10).await.unwrap();
        tx.rollback().await.unwrap();

        let mut conn = storage.pool().acquire().await.unwrap();
        assert_eq!(current(&mut conn, "c", "tx").await.unwrap(), 0);
    }
}
