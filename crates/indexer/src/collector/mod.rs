//! Block collector.
//!
//! The collector owns an ordered list of [`Submodule`]s. `prepare` runs all
//! of them concurrently and may be called for many heights at once. `collect`
//! runs them in order inside a single database transaction and must be called
//! in strictly increasing height order. Once the transaction commits, the
//! [`BlockNotifier`] hears about the block.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use rollscan_core::{ScrapedBlock, VmType};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{Blacklist, MetadataCache};
use crate::config::Config;
use crate::extractor::BlockEvents;
use crate::node::NodeQuerier;
use crate::notifier::{BlockNotification, BlockNotifier};
use crate::storage::Storage;

pub mod arena;
pub mod block;
pub mod nft;
pub mod tx;

pub use arena::{ArenaError, PrepareArena};
pub use block::BlockSubmodule;
pub use nft::{NftCaches, NftSubmodule};
pub use tx::TxSubmodule;

/// One unit of collection work.
///
/// `prepare` must not write to storage: it resolves everything the block
/// needs from the node and stashes it. `collect` must only read what
/// `prepare` stashed plus the open transaction.
#[async_trait]
pub trait Submodule: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Resolve node metadata for `block`.
    async fn prepare(&self, block: &ScrapedBlock) -> Result<()>;

    /// Write `block` through `conn`.
    async fn collect(&self, block: &ScrapedBlock, conn: &mut SqliteConnection) -> Result<()>;
}

/// Runs submodules over blocks and commits their writes atomically.
pub struct Collector {
    storage: Storage,
    submodules: Vec<Arc<dyn Submodule>>,
    notifier: Arc<dyn BlockNotifier>,
}

impl Collector {
    /// Create a collector from an ordered submodule list.
    pub fn new(
        storage: Storage,
        submodules: Vec<Arc<dyn Submodule>>,
        notifier: Arc<dyn BlockNotifier>,
    ) -> Self {
        Self {
            storage,
            submodules,
            notifier,
        }
    }

    /// Build the standard submodule set for the configured VM:
    /// block, then tx, then the VM's NFT reconciler.
    pub fn from_config(
        config: &Config,
        storage: Storage,
        querier: Arc<dyn NodeQuerier>,
        notifier: Arc<dyn BlockNotifier>,
    ) -> Self {
        let chain_id = config.chain.chain_id.clone();
        let arena_capacity = config.cache.arena_capacity;

        let validators = Arc::new(MetadataCache::new(config.cache.validator_capacity));
        let block: Arc<dyn Submodule> = Arc::new(BlockSubmodule::new(
            chain_id.clone(),
            querier.clone(),
            validators,
            arena_capacity,
        ));
        let tx: Arc<dyn Submodule> = Arc::new(TxSubmodule::new(
            chain_id.clone(),
            config.chain.vm,
            config.chain.account_prefix.clone(),
            querier.clone(),
            arena_capacity,
        ));

        let caches = NftCaches {
            collections: Arc::new(MetadataCache::new(config.cache.collection_capacity)),
            objects: Arc::new(MetadataCache::new(config.cache.object_capacity)),
            blacklist: Arc::new(Blacklist::new(config.cache.blacklist_capacity)),
        };
        let nft: Arc<dyn Submodule> = match config.chain.vm {
            VmType::Evm => Arc::new(NftSubmodule::new(
                nft::evm::EvmNft,
                chain_id,
                querier,
                caches,
                arena_capacity,
            )),
            VmType::Move => Arc::new(NftSubmodule::new(
                nft::move_vm::MoveNft,
                chain_id,
                querier,
                caches,
                arena_capacity,
            )),
            VmType::Wasm => Arc::new(NftSubmodule::new(
                nft::wasm::WasmNft,
                chain_id,
                querier,
                caches,
                arena_capacity,
            )),
        };

        info!(
            "Collector configured for {} ({} VM)",
            config.chain.chain_id, config.chain.vm
        );
        Self::new(storage, vec![block, tx, nft], notifier)
    }

    /// Names of the configured submodules, in collect order.
    pub fn submodule_names(&self) -> Vec<&'static str> {
        self.submodules.iter().map(|s| s.name()).collect()
    }

    /// Run every submodule's prepare for `block` concurrently.
    pub async fn prepare(&self, block: &ScrapedBlock) -> Result<()> {
        try_join_all(self.submodules.iter().map(|submodule| async move {
            submodule.prepare(block).await.with_context(|| {
                format!(
                    "Submodule {} failed to prepare block {}",
                    submodule.name(),
                    block.height
                )
            })
        }))
        .await?;

        debug!("Prepared block {}", block.height);
        Ok(())
    }

    /// Commit `block`: every submodule writes inside one transaction.
    ///
    /// On failure the transaction is rolled back and nothing from this block
    /// is visible.
    pub async fn collect(&self, block: &ScrapedBlock) -> Result<()> {
        let mut db_tx = self
            .storage
            .pool()
            .begin()
            .await
            .context("Failed to begin collect transaction")?;

        for submodule in &self.submodules {
            let result = submodule.collect(block, &mut *db_tx).await;
            if let Err(e) = result {
                if let Err(rollback_err) = db_tx.rollback().await {
                    warn!(
                        "Failed to roll back block {}: {:#}",
                        block.height, rollback_err
                    );
                }
                return Err(e.context(format!(
                    "Submodule {} failed to collect block {}",
                    submodule.name(),
                    block.height
                )));
            }
        }

        db_tx
            .commit()
            .await
            .with_context(|| format!("Failed to commit block {}", block.height))?;

        info!(
            "Committed block {} ({} txs)",
            block.height,
            block.txs.len()
        );

        self.notify(block).await;
        Ok(())
    }

    async fn notify(&self, block: &ScrapedBlock) {
        let tx_hashes = match BlockEvents::new(block) {
            Ok(events) => events.tx_hashes().to_vec(),
            Err(e) => {
                warn!("Skipping notification of block {}: {}", block.height, e);
                return;
            }
        };

        let notification = BlockNotification {
            chain_id: block.chain_id.clone(),
            height: block.height,
            tx_hashes,
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!("Notifier failed for block {}: {:#}", block.height, e);
        }
    }
}
