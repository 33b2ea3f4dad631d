//! Transaction submodule.
//!
//! Writes `txs` rows with gap-free sequence numbers, fans each transaction
//! out to the accounts it touches (`account_txs`), records Move
//! fungible-asset store owners and, on EVM rollups, one `evm_txs` row per
//! receipt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rollscan_core::{
    decode_tx, is_bech32_account, normalize_evm_address, normalize_move_address, Event, ScrapedBlock,
    VmType, ATTR_SENDER, EVENT_TYPE_MESSAGE, EVENT_TYPE_MOVE, SEQ_ACCOUNT_TX, SEQ_TX,
};
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{PrepareArena, Submodule};
use crate::extractor::BlockEvents;
use crate::node::{EvmReceipt, NodeQuerier};
use crate::storage::{fa_store, seq, tx, AccountTxRecord, EvmTxRecord, FaStoreRecord, TxRecord};

const NAME: &str = "tx";

const DEPOSIT_EVENT: &str = "0x1::fungible_asset::DepositEvent";
const WITHDRAW_EVENT: &str = "0x1::fungible_asset::WithdrawEvent";
const DEPOSIT_OWNER_EVENT: &str = "0x1::fungible_asset::DepositOwnerEvent";
const WITHDRAW_OWNER_EVENT: &str = "0x1::fungible_asset::WithdrawOwnerEvent";

#[derive(Debug, Clone, Default)]
struct PreparedTxs {
    receipts: Vec<EvmReceipt>,
}

/// Collects transactions and their account links.
pub struct TxSubmodule {
    chain_id: String,
    vm: VmType,
    account_prefix: String,
    querier: Arc<dyn NodeQuerier>,
    prepared: PrepareArena<PreparedTxs>,
}

/// An account touched by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TouchedAccount {
    account: String,
    signer: bool,
}

impl TxSubmodule {
    /// Create the submodule.
    pub fn new(
        chain_id: String,
        vm: VmType,
        account_prefix: String,
        querier: Arc<dyn NodeQuerier>,
        arena_capacity: usize,
    ) -> Self {
        Self {
            chain_id,
            vm,
            account_prefix,
            querier,
            prepared: PrepareArena::new(NAME, arena_capacity),
        }
    }

    /// Accounts named in a transaction's event attributes, sorted.
    fn touched_accounts(&self, events: &[Event], signer: Option<&str>) -> Vec<TouchedAccount> {
        let accounts: BTreeSet<String> = events
            .iter()
            .flat_map(|event| event.attributes.iter())
            .filter_map(|attr| self.as_account(&attr.value))
            .chain(signer.and_then(|s| self.as_account(s)))
            .collect();

        let signer = signer.and_then(|s| self.as_account(s));
        accounts
            .into_iter()
            .map(|account| TouchedAccount {
                signer: signer.as_deref() == Some(account.as_str()),
                account,
            })
            .collect()
    }

    fn as_account(&self, value: &str) -> Option<String> {
        if is_bech32_account(value, &self.account_prefix) {
            return Some(value.to_string());
        }
        normalize_evm_address(value)
    }

    async fn collect_txs(
        &self,
        block: &ScrapedBlock,
        events: &BlockEvents<'_>,
        conn: &mut SqliteConnection,
    ) -> Result<()> {
        let timestamp = block.timestamp_millis();

        let mut new_txs = Vec::new();
        for (index, hash) in events.tx_hashes().iter().enumerate() {
            if !tx::tx_exists(conn, &self.chain_id, hash, block.height).await? {
                new_txs.push(index);
            }
        }

        let first = seq::allocate(conn, &self.chain_id, SEQ_TX, new_txs.len()).await?;
        let mut links = Vec::new();

        for (offset, &index) in new_txs.iter().enumerate() {
            let hash = &events.tx_hashes()[index];
            let result = &block.tx_results[index];
            let signer = first_sender(&result.events);

            let decoded = match decode_tx(&block.txs[index], index) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!("Storing tx {} without a decoded body: {}", hash, e);
                    None
                }
            };
            let payload = json!({
                "tx": block.txs[index],
                "decoded": decoded,
                "log": result.log,
                "events": result.events,
            });

            let record = TxRecord {
                chain_id: self.chain_id.clone(),
                hash: hash.clone(),
                height: block.height,
                sequence: first + offset as i64,
                tx_index: index as i64,
                code: i64::from(result.code),
                codespace: result.codespace.clone(),
                gas_used: result.gas_used,
                gas_wanted: result.gas_wanted,
                signer: signer.map(str::to_string),
                timestamp,
                payload: payload.to_string(),
            };
            tx::insert_tx(conn, &record).await?;

            for touched in self.touched_accounts(&result.events, signer) {
                if !tx::account_tx_exists(
                    conn,
                    &self.chain_id,
                    &touched.account,
                    hash,
                    block.height,
                )
                .await?
                {
                    links.push((hash.clone(), touched));
                }
            }
        }

        let first_link = seq::allocate(conn, &self.chain_id, SEQ_ACCOUNT_TX, links.len()).await?;
        for (offset, (tx_hash, touched)) in links.into_iter().enumerate() {
            let link = AccountTxRecord {
                chain_id: self.chain_id.clone(),
                account: touched.account,
                tx_hash,
                height: block.height,
                sequence: first_link + offset as i64,
                signer: touched.signer,
            };
            tx::insert_account_tx(conn, &link).await?;
        }

        debug!(
            "Block {}: {} new txs of {}",
            block.height,
            new_txs.len(),
            block.txs.len()
        );
        Ok(())
    }

    async fn collect_fa_stores(
        &self,
        block: &ScrapedBlock,
        conn: &mut SqliteConnection,
    ) -> Result<()> {
        for result in &block.tx_results {
            for store in pair_fa_stores(&result.events)? {
                let record = FaStoreRecord {
                    chain_id: self.chain_id.clone(),
                    store_addr: store.0,
                    owner: store.1,
                    height: block.height,
                };
                fa_store::insert_fa_store(conn, &record).await?;
            }
        }
        Ok(())
    }

    async fn collect_receipts(
        &self,
        block: &ScrapedBlock,
        receipts: Vec<EvmReceipt>,
        conn: &mut SqliteConnection,
    ) -> Result<()> {
        for receipt in receipts {
            let record = EvmTxRecord {
                chain_id: self.chain_id.clone(),
                hash: format!("0x{}", hex::encode(receipt.transaction_hash.as_slice())),
                height: block.height,
                tx_index: receipt.transaction_index.saturating_to::<i64>(),
                from_addr: format!("0x{}", hex::encode(receipt.from.as_slice())),
                to_addr: receipt.to.map(|a| format!("0x{}", hex::encode(a.as_slice()))),
                contract_address: receipt
                    .contract_address
                    .map(|a| format!("0x{}", hex::encode(a.as_slice()))),
                status: receipt
                    .status
                    .map(|s| s.saturating_to::<i64>())
                    .unwrap_or(1),
                gas_used: receipt.gas_used.saturating_to::<i64>(),
                log_count: receipt.logs.len() as i64,
            };
            tx::insert_evm_tx(conn, &record).await?;
        }
        Ok(())
    }
}

/// `sender` of the first `message` event that has one.
fn first_sender(events: &[Event]) -> Option<&str> {
    events
        .iter()
        .filter(|event| event.ty == EVENT_TYPE_MESSAGE)
        .find_map(|event| event.attribute(ATTR_SENDER))
}

/// Pair each deposit/withdraw store with the owner event that follows it.
fn pair_fa_stores(events: &[Event]) -> Result<Vec<(String, String)>> {
    let mut stores = Vec::new();
    let mut pending: Option<String> = None;

    for event in events.iter().filter(|e| e.ty == EVENT_TYPE_MOVE) {
        let Some(type_tag) = event.attribute("type_tag") else {
            continue;
        };
        let field = match type_tag {
            DEPOSIT_EVENT | WITHDRAW_EVENT => "store_addr",
            DEPOSIT_OWNER_EVENT | WITHDRAW_OWNER_EVENT => "owner",
            _ => continue,
        };

        let data: Value = serde_json::from_str(event.attribute("data").unwrap_or("{}"))
            .with_context(|| format!("Invalid data of {}", type_tag))?;
        let Some(raw) = data.get(field).and_then(Value::as_str) else {
            warn!("{} without {}", type_tag, field);
            continue;
        };
        let addr = normalize_move_address(raw)?;

        if field == "store_addr" {
            pending = Some(addr);
        } else if let Some(store) = pending.take() {
            stores.push((store, addr));
        }
    }

    Ok(stores)
}

#[async_trait]
impl Submodule for TxSubmodule {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&self, block: &ScrapedBlock) -> Result<()> {
        let mut prepared = PreparedTxs::default();
        if self.vm == VmType::Evm && !block.txs.is_empty() {
            prepared.receipts = self
                .querier
                .evm_block_receipts(block.height)
                .await
                .with_context(|| format!("Failed to fetch receipts of block {}", block.height))?;
        }
        self.prepared.insert(block.height, prepared)?;
        Ok(())
    }

    async fn collect(&self, block: &ScrapedBlock, conn: &mut SqliteConnection) -> Result<()> {
        let prepared = self.prepared.take(block.height)?;
        let events = BlockEvents::new(block)?;

        self.collect_txs(block, &events, conn).await?;
        match self.vm {
            VmType::Move => self.collect_fa_stores(block, conn).await?,
            VmType::Evm => self.collect_receipts(block, prepared.receipts, conn).await?,
            VmType::Wasm => {}
        }
        Ok(())
    }
}
