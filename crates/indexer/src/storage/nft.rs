//! NFT collection and token storage operations.
//!
//! Write policies:
//! - collections and minted tokens are insert-if-absent
//! - a token re-minted after a burn in the same block overwrites the row
//! - transfers upsert owner, height and timestamp
//! - burns delete the row
//! - `nft_count` is always recomputed from the live rows

use super::{NftCollectionRecord, NftRecord, Storage};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Insert a collection unless it already exists.
pub async fn insert_collection(
    conn: &mut SqliteConnection,
    collection: &NftCollectionRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nft_collections (chain_id, addr, name, creator, height, timestamp, nft_count)
        VALUES (?, ?, ?, ?, ?, ?, 0)
        ON CONFLICT(chain_id, addr) DO NOTHING
        "#,
    )
    .bind(&collection.chain_id)
    .bind(&collection.addr)
    .bind(&collection.name)
    .bind(&collection.creator)
    .bind(collection.height)
    .bind(collection.timestamp)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert collection {}", collection.addr))?;

    Ok(())
}

/// Insert a minted token unless it already exists.
pub async fn insert_nft(conn: &mut SqliteConnection, nft: &NftRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nfts (
            chain_id, collection_addr, token_id, object_addr, owner,
            token_uri, height, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, collection_addr, token_id) DO NOTHING
        "#,
    )
    .bind(&nft.chain_id)
    .bind(&nft.collection_addr)
    .bind(&nft.token_id)
    .bind(&nft.object_addr)
    .bind(&nft.owner)
    .bind(&nft.token_uri)
    .bind(nft.height)
    .bind(nft.timestamp)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert nft {}:{}", nft.collection_addr, nft.token_id))?;

    Ok(())
}

/// Insert a re-minted token, overwriting every mutable column of a stale row.
pub async fn replace_nft(conn: &mut SqliteConnection, nft: &NftRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nfts (
            chain_id, collection_addr, token_id, object_addr, owner,
            token_uri, height, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, collection_addr, token_id) DO UPDATE SET
            object_addr = excluded.object_addr,
            owner = excluded.owner,
            token_uri = excluded.token_uri,
            height = excluded.height,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(&nft.chain_id)
    .bind(&nft.collection_addr)
    .bind(&nft.token_id)
    .bind(&nft.object_addr)
    .bind(&nft.owner)
    .bind(&nft.token_uri)
    .bind(nft.height)
    .bind(nft.timestamp)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to re-mint nft {}:{}", nft.collection_addr, nft.token_id))?;

    Ok(())
}

/// Record a transfer: insert the token or update its owner, height and timestamp.
pub async fn upsert_nft_owner(conn: &mut SqliteConnection, nft: &NftRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nfts (
            chain_id, collection_addr, token_id, object_addr, owner,
            token_uri, height, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, collection_addr, token_id) DO UPDATE SET
            owner = excluded.owner,
            height = excluded.height,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(&nft.chain_id)
    .bind(&nft.collection_addr)
    .bind(&nft.token_id)
    .bind(&nft.object_addr)
    .bind(&nft.owner)
    .bind(&nft.token_uri)
    .bind(nft.height)
    .bind(nft.timestamp)
    .execute(&mut *conn)
    .await
    .with_context(|| {
        format!(
            "Failed to transfer nft {}:{}",
            nft.collection_addr, nft.token_id
        )
    })?;

    Ok(())
}

/// Delete a burned token.
pub async fn delete_nft(
    conn: &mut SqliteConnection,
    chain_id: &str,
    collection_addr: &str,
    token_id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM nfts WHERE chain_id = ? AND collection_addr = ? AND token_id = ?")
        .bind(chain_id)
        .bind(collection_addr)
        .bind(token_id)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to delete nft {}:{}", collection_addr, token_id))?;

    Ok(())
}

/// Set `nft_count` of a collection to the number of its live tokens.
pub async fn recompute_nft_count(
    conn: &mut SqliteConnection,
    chain_id: &str,
    collection_addr: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE nft_collections
        SET nft_count = (
            SELECT COUNT(*) FROM nfts
            WHERE nfts.chain_id = nft_collections.chain_id
              AND nfts.collection_addr = nft_collections.addr
        )
        WHERE chain_id = ? AND addr = ?
        "#,
    )
    .bind(chain_id)
    .bind(collection_addr)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to recompute nft count of {}", collection_addr))?;

    Ok(())
}

fn collection_from_row(row: &SqliteRow) -> NftCollectionRecord {
    NftCollectionRecord {
        chain_id: row.get("chain_id"),
        addr: row.get("addr"),
        name: row.get("name"),
        creator: row.get("creator"),
        height: row.get("height"),
        timestamp: row.get("timestamp"),
        nft_count: row.get("nft_count"),
    }
}

fn nft_from_row(row: &SqliteRow) -> NftRecord {
    NftRecord {
        chain_id: row.get("chain_id"),
        collection_addr: row.get("collection_addr"),
        token_id: row.get("token_id"),
        object_addr: row.get("object_addr"),
        owner: row.get("owner"),
        token_uri: row.get("token_uri"),
        height: row.get("height"),
        timestamp: row.get("timestamp"),
    }
}

impl Storage {
    /// Get a collection by address.
    pub async fn get_collection(
        &self,
        chain_id: &str,
        addr: &str,
    ) -> Result<Option<NftCollectionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT chain_id, addr, name, creator, height, timestamp, nft_count
            FROM nft_collections
            WHERE chain_id = ? AND addr = ?
            "#,
        )
        .bind(chain_id)
        .bind(addr)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch collection")?;

        Ok(row.as_ref().map(collection_from_row))
    }

    /// Get a token by collection and id.
    pub async fn get_nft(
        &self,
        chain_id: &str,
        collection_addr: &str,
        token_id: &str,
    ) -> Result<Option<NftRecord>> {
        let row = sqlx::query(
            r#"
            SELECT chain_id, collection_addr, token_id, object_addr, owner,
                   token_uri, height, timestamp
            FROM nfts
            WHERE chain_id = ? AND collection_addr = ? AND token_id = ?
            "#,
        )
        .bind(chain_id)
        .bind(collection_addr)
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch nft")?;

        Ok(row.as_ref().map(nft_from_row))
    }

    /// Live tokens of a collection ordered by token id.
    pub async fn list_nfts(&self, chain_id: &str, collection_addr: &str) -> Result<Vec<NftRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chain_id, collection_addr, token_id, object_addr, owner,
                   token_uri, height, timestamp
            FROM nfts
            WHERE chain_id = ? AND collection_addr = ?
            ORDER BY token_id ASC
            "#,
        )
        .bind(chain_id)
        .bind(collection_addr)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list nfts")?;

        Ok(rows.iter().map(nft_from_row).collect())
    }
}
