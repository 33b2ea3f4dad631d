//! Transaction storage operations.

use super::{AccountTxRecord, EvmTxRecord, Storage, TxRecord};
use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};

/// Whether a transaction row exists for `(chain_id, hash, height)`.
pub async fn tx_exists(
    conn: &mut SqliteConnection,
    chain_id: &str,
    hash: &str,
    height: i64,
) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM txs WHERE chain_id = ? AND hash = ? AND height = ?")
            .bind(chain_id)
            .bind(hash)
            .bind(height)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to look up transaction")?;

    Ok(found.is_some())
}

/// Insert a transaction unless it already exists.
pub async fn insert_tx(conn: &mut SqliteConnection, tx: &TxRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO txs (
            chain_id, hash, height, sequence, tx_index, code, codespace,
            gas_used, gas_wanted, signer, timestamp, payload
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, hash, height) DO NOTHING
        "#,
    )
    .bind(&tx.chain_id)
    .bind(&tx.hash)
    .bind(tx.height)
    .bind(tx.sequence)
    .bind(tx.tx_index)
    .bind(tx.code)
    .bind(&tx.codespace)
    .bind(tx.gas_used)
    .bind(tx.gas_wanted)
    .bind(&tx.signer)
    .bind(tx.timestamp)
    .bind(&tx.payload)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert transaction {}", tx.hash))?;

    Ok(())
}

/// Whether an account link exists for `(chain_id, account, tx_hash, height)`.
pub async fn account_tx_exists(
    conn: &mut SqliteConnection,
    chain_id: &str,
    account: &str,
    tx_hash: &str,
    height: i64,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM account_txs
        WHERE chain_id = ? AND account = ? AND tx_hash = ? AND height = ?
        "#,
    )
    .bind(chain_id)
    .bind(account)
    .bind(tx_hash)
    .bind(height)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to look up account transaction")?;

    Ok(found.is_some())
}

/// Insert an account link unless it already exists.
pub async fn insert_account_tx(conn: &mut SqliteConnection, link: &AccountTxRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO account_txs (chain_id, account, tx_hash, height, sequence, signer)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, account, tx_hash, height) DO NOTHING
        "#,
    )
    .bind(&link.chain_id)
    .bind(&link.account)
    .bind(&link.tx_hash)
    .bind(link.height)
    .bind(link.sequence)
    .bind(link.signer)
    .execute(&mut *conn)
    .await
    .context("Failed to insert account transaction")?;

    Ok(())
}

/// Insert an EVM receipt summary unless it already exists.
pub async fn insert_evm_tx(conn: &mut SqliteConnection, tx: &EvmTxRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO evm_txs (
            chain_id, hash, height, tx_index, from_addr, to_addr,
            contract_address, status, gas_used, log_count
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain_id, hash) DO NOTHING
        "#,
    )
    .bind(&tx.chain_id)
    .bind(&tx.hash)
    .bind(tx.height)
    .bind(tx.tx_index)
    .bind(&tx.from_addr)
    .bind(&tx.to_addr)
    .bind(&tx.contract_address)
    .bind(tx.status)
    .bind(tx.gas_used)
    .bind(tx.log_count)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert evm transaction {}", tx.hash))?;

    Ok(())
}

impl Storage {
    /// All transactions of a chain ordered by sequence.
    pub async fn get_txs(&self, chain_id: &str) -> Result<Vec<TxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chain_id, hash, height, sequence, tx_index, code, codespace,
                   gas_used, gas_wanted, signer, timestamp, payload
            FROM txs
            WHERE chain_id = ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch transactions")?;

        Ok(rows
            .iter()
            .map(|row| TxRecord {
                chain_id: row.get("chain_id"),
                hash: row.get("hash"),
                height: row.get("height"),
                sequence: row.get("sequence"),
                tx_index: row.get("tx_index"),
                code: row.get("code"),
                codespace: row.get("codespace"),
                gas_used: row.get("gas_used"),
                gas_wanted: row.get("gas_wanted"),
                signer: row.get("signer"),
                timestamp: row.get("timestamp"),
                payload: row.get("payload"),
            })
            .collect())
    }

    /// All account links of a chain ordered by sequence.
    pub async fn get_account_txs(&self, chain_id: &str) -> Result<Vec<AccountTxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chain_id, account, tx_hash, height, sequence, signer
            FROM account_txs
            WHERE chain_id = ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch account transactions")?;

        Ok(rows
            .iter()
            .map(|row| AccountTxRecord {
                chain_id: row.get("chain_id"),
                account: row.get("account"),
                tx_hash: row.get("tx_hash"),
                height: row.get("height"),
                sequence: row.get("sequence"),
                signer: row.get("signer"),
            })
            .collect())
    }

    /// EVM receipt summaries at `height`, in block order.
    pub async fn get_evm_txs(&self, chain_id: &str, height: i64) -> Result<Vec<EvmTxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chain_id, hash, height, tx_index, from_addr, to_addr,
                   contract_address, status, gas_used, log_count
            FROM evm_txs
            WHERE chain_id = ? AND height = ?
            ORDER BY tx_index ASC
            "#,
        )
        .bind(chain_id)
        .bind(height)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch evm transactions")?;

        Ok(rows
            .iter()
            .map(|row| EvmTxRecord {
                chain_id: row.get("chain_id"),
                hash: row.get("hash"),
                height: row.get("height"),
                tx_index: row.get("tx_index"),
                from_addr: row.get("from_addr"),
                to_addr: row.get("to_addr"),
                contract_address: row.get("contract_address"),
                status: row.get("status"),
                gas_used: row.get("gas_used"),
                log_count: row.get("log_count"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::setup_storage;

    fn sample_tx(hash: &str, sequence: i64) -> TxRecord {
        TxRecord {
            chain_id: "rollup-1".to_string(),
            hash: hash.to_string(),
            height: 5,
            sequence,
            tx_index: 0,
            code: 0,
            codespace: String::new(),
            gas_used: 10,
            gas_wanted: 20,
            signer: Some("init1signer".to_string()),
            timestamp: 0,
            payload: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_tx_is_idempotent() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        assert!(!tx_exists(&mut conn, "rollup-1", "AB", 5).await.unwrap());
        insert_tx(&mut conn, &sample_tx("AB", 1)).await.unwrap();
        insert_tx(&mut conn, &sample_tx("AB", 1)).await.unwrap();
        assert!(tx_exists(&mut conn, "rollup-1", "AB", 5).await.unwrap());

        let txs = storage.get_txs("rollup-1").await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].signer.as_deref(), Some("init1signer"));
    }

    #[tokio::test]
    async fn test_duplicate_sequence_is_rejected() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        insert_tx(&mut conn, &sample_tx("AB", 1)).await.unwrap();
        assert!(insert_tx(&mut conn, &sample_tx("CD", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_account_tx_round_trip() {
        let (storage, _temp_db) = setup_storage().await;
        let mut conn = storage.pool().acquire().await.unwrap();

        let link = AccountTxRecord {
            chain_id: "rollup-1".to_string(),
            account: "init1abc".to_string(),
            tx_hash: "AB".to_string(),
            height: 5,
            sequence: 1,
            signer: true,
        };
        insert_account_tx(&mut conn, &link).await.unwrap();
        insert_account_tx(&mut conn, &link).await.unwrap();

        assert!(account_tx_exists(&mut conn, "rollup-1", "init1abc", "AB", 5)
            .await
            .unwrap());
        assert_eq!(storage.get_account_txs("rollup-1").await.unwrap(), vec![link]);
    }
}
