//! NFT reconciliation.
//!
//! One engine ([`NftSubmodule`]) drives three VM adapters ([`NftVm`]). The
//! adapter turns a block's events into [`NftOp`]s and knows how to ask the
//! node about collections, objects and token URIs; the engine owns caching,
//! blacklisting, the prepare stash and the writes.
//!
//! Prepare:
//! 1. scan events into ops
//! 2. resolve object-addressed ops (Move) to token keys
//! 3. fold ops into intents
//! 4. fetch metadata of touched collections not yet cached
//! 5. fetch token URIs of surviving mints
//!
//! Collect re-scans the block and rebuilds the same intents from the stash
//! alone, so nothing that changes between prepare and collect (caches,
//! blacklist) can alter what is written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use rollscan_core::ScrapedBlock;
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{PrepareArena, Submodule};
use crate::cache::{Blacklist, MetadataCache};
use crate::extractor::BlockEvents;
use crate::node::{NodeQuerier, QueryError};
use crate::storage::{nft as nft_store, NftCollectionRecord, NftRecord};

pub mod evm;
pub mod intent;
pub mod move_vm;
pub mod wasm;

pub use intent::{CollectionMeta, IntentMap, NftKey, NftOp, NftTarget};

/// VM-specific half of the NFT reconciler.
#[async_trait]
pub trait NftVm: Send + Sync + 'static {
    /// Submodule name.
    fn name(&self) -> &'static str;

    /// NFT operations in the block, in event order.
    fn scan(&self, events: &BlockEvents<'_>) -> Result<Vec<NftOp>>;

    /// Token key of an object-addressed NFT.
    async fn resolve_object(
        &self,
        _querier: &dyn NodeQuerier,
        _object: &str,
        _height: i64,
    ) -> Result<NftKey, QueryError> {
        Err(QueryError::NotConfigured("object resolution"))
    }

    /// Name and creator of `collection`.
    async fn collection_metadata(
        &self,
        querier: &dyn NodeQuerier,
        collection: &str,
        height: i64,
    ) -> Result<CollectionMeta, QueryError>;

    /// Token URI of a freshly minted token, if the contract exposes one.
    async fn token_uri(
        &self,
        querier: &dyn NodeQuerier,
        key: &NftKey,
        object: Option<&str>,
        height: i64,
    ) -> Result<Option<String>, QueryError>;
}

/// Caches shared by one NFT submodule across blocks.
#[derive(Clone)]
pub struct NftCaches {
    /// Collection address to metadata.
    pub collections: Arc<MetadataCache<String, CollectionMeta>>,
    /// Object address to token key.
    pub objects: Arc<MetadataCache<String, NftKey>>,
    /// Addresses that are not NFT collections or objects.
    pub blacklist: Arc<Blacklist>,
}

impl NftCaches {
    /// Empty caches of the given size.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            collections: Arc::new(MetadataCache::new(size)),
            objects: Arc::new(MetadataCache::new(size)),
            blacklist: Arc::new(Blacklist::new(size)),
        }
    }
}

/// Everything collect needs beyond the block itself.
#[derive(Debug, Default)]
struct PreparedNfts {
    objects: HashMap<String, NftKey>,
    collections: HashMap<String, CollectionMeta>,
    token_uris: HashMap<NftKey, Option<String>>,
    /// Collections whose ops are ignored in this block.
    dropped: BTreeSet<String>,
}

/// Fold `ops` into intents, resolving object targets through `objects` and
/// skipping dropped collections.
fn build_intents(
    ops: Vec<NftOp>,
    objects: &HashMap<String, NftKey>,
    dropped: &BTreeSet<String>,
) -> IntentMap {
    let mut intents = IntentMap::default();
    for op in ops {
        if let NftOp::CollectionCreated { collection, .. } = &op {
            if !dropped.contains(collection) {
                intents.apply(None, op);
            }
            continue;
        }

        let key = op.target().and_then(|target| {
            target.key.clone().or_else(|| {
                target
                    .object
                    .as_ref()
                    .and_then(|object| objects.get(object).cloned())
            })
        });
        if let Some(key) = key.filter(|k| !dropped.contains(&k.collection)) {
            intents.apply(Some(key), op);
        }
    }
    intents
}

/// NFT submodule over a VM adapter.
pub struct NftSubmodule<V> {
    vm: V,
    chain_id: String,
    querier: Arc<dyn NodeQuerier>,
    caches: NftCaches,
    prepared: PrepareArena<PreparedNfts>,
}

impl<V: NftVm> NftSubmodule<V> {
    /// Create the submodule with injected caches.
    pub fn new(
        vm: V,
        chain_id: String,
        querier: Arc<dyn NodeQuerier>,
        caches: NftCaches,
        arena_capacity: usize,
    ) -> Self {
        let name = vm.name();
        Self {
            vm,
            chain_id,
            querier,
            caches,
            prepared: PrepareArena::new(name, arena_capacity),
        }
    }

    /// Resolve every object-only target that is neither known in this block
    /// nor cached nor blacklisted.
    async fn resolve_objects(
        &self,
        ops: &[NftOp],
        height: i64,
        objects: &mut HashMap<String, NftKey>,
    ) -> Result<()> {
        for target in ops.iter().filter_map(NftOp::target) {
            if let (Some(key), Some(object)) = (&target.key, &target.object) {
                objects.insert(object.clone(), key.clone());
                self.caches.objects.insert(object.clone(), key.clone());
            }
        }

        let mut unknown = BTreeSet::new();
        for object in ops
            .iter()
            .filter_map(NftOp::target)
            .filter(|target| target.key.is_none())
            .filter_map(|target| target.object.as_ref())
        {
            if objects.contains_key(object) || self.caches.blacklist.contains(object) {
                continue;
            }
            match self.caches.objects.get(object) {
                Some(key) => {
                    objects.insert(object.clone(), key);
                }
                None => {
                    unknown.insert(object.clone());
                }
            }
        }

        let querier = self.querier.as_ref();
        let results = join_all(unknown.into_iter().map(|object| async move {
            let result = self.vm.resolve_object(querier, &object, height).await;
            (object, result)
        }))
        .await;

        for (object, result) in results {
            match result {
                Ok(key) => {
                    self.caches.objects.insert(object.clone(), key.clone());
                    objects.insert(object, key);
                }
                Err(e) if e.is_invalid_nft() => {
                    debug!("Blacklisting object {}: {}", object, e);
                    self.caches.blacklist.insert(object);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to resolve object {}", object));
                }
            }
        }
        Ok(())
    }

    /// Metadata for every touched collection; blacklisted ones go to `dropped`.
    async fn resolve_collections(
        &self,
        intents: &IntentMap,
        height: i64,
        collections: &mut HashMap<String, CollectionMeta>,
        dropped: &mut BTreeSet<String>,
    ) -> Result<()> {
        let mut unknown = Vec::new();
        for collection in intents.touched_collections() {
            if self.caches.blacklist.contains(&collection) {
                dropped.insert(collection);
                continue;
            }
            let from_event = intents.created.get(&collection).cloned().flatten();
            match from_event.or_else(|| self.caches.collections.get(&collection)) {
                Some(meta) => {
                    self.caches.collections.insert(collection.clone(), meta.clone());
                    collections.insert(collection, meta);
                }
                None => unknown.push(collection),
            }
        }

        let querier = self.querier.as_ref();
        let results = join_all(unknown.into_iter().map(|collection| async move {
            let result = self
                .vm
                .collection_metadata(querier, &collection, height)
                .await;
            (collection, result)
        }))
        .await;

        for (collection, result) in results {
            match result {
                Ok(meta) => {
                    self.caches.collections.insert(collection.clone(), meta.clone());
                    collections.insert(collection, meta);
                }
                Err(e) if e.is_invalid_nft() => {
                    warn!("Blacklisting collection {}: {}", collection, e);
                    self.caches.blacklist.insert(collection.clone());
                    dropped.insert(collection);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to fetch metadata of collection {}", collection)
                    });
                }
            }
        }
        Ok(())
    }

    async fn resolve_token_uris(
        &self,
        intents: &IntentMap,
        height: i64,
    ) -> Result<HashMap<NftKey, Option<String>>> {
        let querier = self.querier.as_ref();
        let results = join_all(intents.mints.iter().map(|(key, mint)| async move {
            let result = self
                .vm
                .token_uri(querier, key, mint.object.as_deref(), height)
                .await;
            (key.clone(), result)
        }))
        .await;

        let mut uris = HashMap::new();
        for (key, result) in results {
            let uri = match result {
                Ok(uri) => uri,
                Err(e) if e.is_invalid_nft() => {
                    debug!(
                        "No token URI for {}:{}: {}",
                        key.collection, key.token_id, e
                    );
                    None
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to fetch token URI of {}:{}",
                            key.collection, key.token_id
                        )
                    });
                }
            };
            uris.insert(key, uri);
        }
        Ok(uris)
    }
}

#[async_trait]
impl<V: NftVm> Submodule for NftSubmodule<V> {
    fn name(&self) -> &'static str {
        self.vm.name()
    }

    async fn prepare(&self, block: &ScrapedBlock) -> Result<()> {
        let events = BlockEvents::new(block)?;
        let ops = self.vm.scan(&events)?;
        let mut prepared = PreparedNfts::default();

        if !ops.is_empty() {
            self.resolve_objects(&ops, block.height, &mut prepared.objects)
                .await?;

            let intents = build_intents(ops.clone(), &prepared.objects, &prepared.dropped);
            self.resolve_collections(
                &intents,
                block.height,
                &mut prepared.collections,
                &mut prepared.dropped,
            )
            .await?;

            let intents = build_intents(ops, &prepared.objects, &prepared.dropped);
            prepared.token_uris = self.resolve_token_uris(&intents, block.height).await?;
        }

        self.prepared.insert(block.height, prepared)?;
        Ok(())
    }

    async fn collect(&self, block: &ScrapedBlock, conn: &mut SqliteConnection) -> Result<()> {
        let prepared = self.prepared.take(block.height)?;
        let events = BlockEvents::new(block)?;
        let intents = build_intents(self.vm.scan(&events)?, &prepared.objects, &prepared.dropped);
        if intents.is_empty() {
            return Ok(());
        }

        let timestamp = block.timestamp_millis();
        let touched = intents.touched_collections();

        for collection in &touched {
            let meta = prepared.collections.get(collection).with_context(|| {
                format!("Collection {} was not resolved during prepare", collection)
            })?;
            let record = NftCollectionRecord {
                chain_id: self.chain_id.clone(),
                addr: collection.clone(),
                name: meta.name.clone(),
                creator: meta.creator.clone(),
                height: block.height,
                timestamp,
                nft_count: 0,
            };
            nft_store::insert_collection(conn, &record).await?;
        }

        for (key, mint) in &intents.mints {
            let record = NftRecord {
                chain_id: self.chain_id.clone(),
                collection_addr: key.collection.clone(),
                token_id: key.token_id.clone(),
                object_addr: mint.object.clone(),
                owner: mint.owner.clone(),
                token_uri: prepared.token_uris.get(key).cloned().flatten(),
                height: block.height,
                timestamp,
            };
            if mint.replaces {
                nft_store::replace_nft(conn, &record).await?;
            } else {
                nft_store::insert_nft(conn, &record).await?;
            }
        }

        for (key, transfer) in &intents.transfers {
            let record = NftRecord {
                chain_id: self.chain_id.clone(),
                collection_addr: key.collection.clone(),
                token_id: key.token_id.clone(),
                object_addr: transfer.object.clone(),
                owner: transfer.to.clone(),
                token_uri: None,
                height: block.height,
                timestamp,
            };
            nft_store::upsert_nft_owner(conn, &record).await?;
        }

        for key in &intents.burns {
            nft_store::delete_nft(conn, &self.chain_id, &key.collection, &key.token_id).await?;
        }

        for collection in &touched {
            nft_store::recompute_nft_count(conn, &self.chain_id, collection).await?;
        }

        debug!(
            "Block {}: {} mints, {} transfers, {} burns across {} collections",
            block.height,
            intents.mints.len(),
            intents.transfers.len(),
            intents.burns.len(),
            touched.len()
        );
        Ok(())
    }
}
