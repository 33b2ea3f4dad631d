//! Move fungible-asset store operations.

use super::{FaStoreRecord, Storage};
use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};

/// Insert a store/owner pair unless the store is already known.
pub async fn insert_fa_store(conn: &mut SqliteConnection, store: &FaStoreRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO fa_stores (chain_id, store_addr, owner, height)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(chain_id, store_addr) DO NOTHING
        "#,
    )
    .bind(&store.chain_id)
    .bind(&store.store_addr)
    .bind(&store.owner)
    .bind(store.height)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert fa store {}", store.store_addr))?;

    Ok(())
}

impl Storage {
    /// Get the owner record of a store.
    pub async fn get_fa_store(&self, chain_id: &str, store_addr: &str) -> Result<Option<FaStoreRecord>> {
        let row = sqlx::query(
            "SELECT chain_id, store_addr, owner, height FROM fa_stores WHERE chain_id = ? AND store_addr = ?",
        )
        .bind(chain_id)
        .bind(store_addr)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch fa store")?;

        Ok(row.map(|row| FaStoreRecord {
            chain_id: row.get("chain_id"),
            store_addr: row.get("store_addr"),
            owner: row.get("owner"),
            height: row.get("height"),
        }))
    }
}
