//! Block header submodule.
//!
//! Writes one `blocks` row per height: hash, timestamp, resolved proposer,
//! summed fees, gas totals and the time since the previous block.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rollscan_core::{CoinTotals, ScrapedBlock, ATTR_FEE, EVENT_TYPE_TX};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{PrepareArena, Submodule};
use crate::cache::MetadataCache;
use crate::extractor::{BlockEvents, EventMatcher};
use crate::node::{NodeQuerier, QueryError};
use crate::storage::{block, BlockRecord};

const NAME: &str = "block";

/// Statuses of a node that does not serve the validator endpoint at all.
const ENDPOINT_UNSUPPORTED: [u16; 2] = [404, 501];

/// What `prepare` resolved for one block.
#[derive(Debug, Clone)]
struct PreparedBlock {
    proposer: String,
}

/// Collects block headers.
pub struct BlockSubmodule {
    chain_id: String,
    querier: Arc<dyn NodeQuerier>,
    /// Consensus address to operator address.
    validators: Arc<MetadataCache<String, String>>,
    prepared: PrepareArena<PreparedBlock>,
}

impl BlockSubmodule {
    /// Create the submodule with an injected validator cache.
    pub fn new(
        chain_id: String,
        querier: Arc<dyn NodeQuerier>,
        validators: Arc<MetadataCache<String, String>>,
        arena_capacity: usize,
    ) -> Self {
        Self {
            chain_id,
            querier,
            validators,
            prepared: PrepareArena::new(NAME, arena_capacity),
        }
    }

    /// Operator address of the validator with `consensus_address`.
    ///
    /// A cache miss reloads the whole validator set. A validator the node
    /// does not know, or a node without the validator endpoint, resolves to
    /// the consensus address itself. Any other load failure is returned and
    /// nothing is cached.
    async fn resolve_proposer(&self, consensus_address: &str) -> Result<String, QueryError> {
        let key = consensus_address.to_string();
        if let Some(operator) = self.validators.get(&key) {
            return Ok(operator);
        }

        match self.querier.validators().await {
            Ok(validators) => {
                for validator in validators {
                    self.validators
                        .insert(validator.consensus_address, validator.operator_address);
                }
            }
            Err(QueryError::Status { status, body }) if ENDPOINT_UNSUPPORTED.contains(&status) => {
                warn!("Validator endpoint unavailable ({}): {}", status, body);
            }
            Err(e) => return Err(e),
        }

        Ok(match self.validators.get(&key) {
            Some(operator) => operator,
            None => {
                debug!("Unknown proposer {}", consensus_address);
                self.validators.insert(key.clone(), key.clone());
                key
            }
        })
    }

    fn total_fee(events: &BlockEvents<'_>) -> Result<String> {
        let mut totals = CoinTotals::new();
        for event in events.iter(&EventMatcher::exact(EVENT_TYPE_TX)) {
            if let Some(fee) = event.get(ATTR_FEE) {
                totals
                    .add_all(fee)
                    .with_context(|| format!("Invalid fee in tx {}", event.tx_hash))?;
            }
        }
        serde_json::to_string(&totals.coins()).context("Failed to encode total fee")
    }
}

#[async_trait]
impl Submodule for BlockSubmodule {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&self, block: &ScrapedBlock) -> Result<()> {
        let proposer = self
            .resolve_proposer(&block.proposer)
            .await
            .with_context(|| format!("Failed to resolve proposer of block {}", block.height))?;
        self.prepared
            .insert(block.height, PreparedBlock { proposer })?;
        Ok(())
    }

    async fn collect(&self, block: &ScrapedBlock, conn: &mut SqliteConnection) -> Result<()> {
        let prepared = self.prepared.take(block.height)?;
        let events = BlockEvents::new(block)?;

        let timestamp = block.timestamp_millis();
        let block_time = block::block_timestamp(conn, &self.chain_id, block.height - 1)
            .await?
            .map(|previous| timestamp - previous);

        let record = BlockRecord {
            chain_id: self.chain_id.clone(),
            height: block.height,
            hash: block.hash.clone(),
            timestamp,
            block_time,
            proposer: prepared.proposer,
            total_fee: Self::total_fee(&events)?,
            tx_count: block.txs.len() as i64,
            gas_used: block.tx_results.iter().map(|r| r.gas_used).sum(),
            gas_wanted: block.tx_results.iter().map(|r| r.gas_wanted).sum(),
        };

        block::insert_block(conn, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ValidatorInfo;
    use crate::storage::tests::setup_storage;
    use crate::test_utils::{BlockBuilder, MockQuerier};
    use chrono::{Duration, TimeZone, Utc};
    use rollscan_core::Event;

    fn submodule(querier: Arc<MockQuerier>) -> BlockSubmodule {
        BlockSubmodule::new(
            "rollup-1".into(),
            querier,
            Arc::new(MetadataCache::new(16)),
            16,
        )
    }

    fn validator(consensus: &str, operator: &str) -> ValidatorInfo {
        ValidatorInfo {
            operator_address: operator.into(),
            moniker: "val".into(),
            consensus_address: consensus.into(),
        }
    }

    #[tokio::test]
    async fn test_collect_writes_header_with_fees_and_block_time() {
        let (storage, _temp_db) = setup_storage().await;
        let querier = Arc::new(MockQuerier::default());
        querier.set_validators(vec![validator("CONS1", "initvaloper1abc")]);
        let module = submodule(querier.clone());

        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let first = BlockBuilder::new(10)
            .timestamp(t0)
            .proposer("CONS1")
            .build();
        let second = BlockBuilder::new(11)
            .timestamp(t0 + Duration::milliseconds(1500))
            .proposer("CONS1")
            .tx_with_gas(
                "aGVsbG8=",
                vec![Event::new("tx", [("fee", "100uinit,5uusdc")])],
                200,
                150,
            )
            .tx_with_gas("d29ybGQ=", vec![Event::new("tx", [("fee", "50uinit")])], 100, 80)
            .build();

        let mut conn = storage.pool().acquire().await.unwrap();
        for block in [&first, &second] {
            module.prepare(block).await.unwrap();
            module.collect(block, &mut conn).await.unwrap();
        }
        drop(conn);

        let row = storage.get_block("rollup-1", 11).await.unwrap().unwrap();
        assert_eq!(row.proposer, "initvaloper1abc");
        assert_eq!(row.block_time, Some(1500));
        assert_eq!(row.tx_count, 2);
        assert_eq!(row.gas_wanted, 300);
        assert_eq!(row.gas_used, 230);
        let fee: serde_json::Value = serde_json::from_str(&row.total_fee).unwrap();
        assert_eq!(
            fee,
            serde_json::json!([
                {"denom": "uinit", "amount": "150"},
                {"denom": "uusdc", "amount": "5"}
            ])
        );

        let first_row = storage.get_block("rollup-1", 10).await.unwrap().unwrap();
        assert_eq!(first_row.block_time, None);
        assert_eq!(first_row.total_fee, "[]");

        // One validator load served both blocks.
        assert_eq!(querier.validator_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_proposer_falls_back_to_consensus_address() {
        let querier = Arc::new(MockQuerier::default());
        querier.set_validators(vec![validator("CONS1", "initvaloper1abc")]);
        let module = submodule(querier.clone());

        assert_eq!(module.resolve_proposer("CONS9").await.unwrap(), "CONS9");
        // Cached, so no second attempt.
        assert_eq!(module.resolve_proposer("CONS9").await.unwrap(), "CONS9");
        assert_eq!(module.resolve_proposer("CONS1").await.unwrap(), "initvaloper1abc");
        assert_eq!(querier.validator_calls(), 1);
    }

    #[tokio::test]
    async fn test_validator_load_failure_is_not_cached() {
        let querier = Arc::new(MockQuerier::default());
        querier.set_validators(vec![validator("CONS1", "initvaloper1abc")]);
        querier.fail_validators();
        let module = submodule(querier.clone());
        let block = BlockBuilder::new(4).proposer("CONS1").build();

        let err = module.prepare(&block).await.unwrap_err();
        assert!(format!("{:#}", err).contains("proposer of block 4"));

        querier.recover_validators();
        assert_eq!(module.resolve_proposer("CONS1").await.unwrap(), "initvaloper1abc");
        assert_eq!(querier.validator_calls(), 2);
    }

    #[tokio::test]
    async fn test_collect_without_prepare_fails() {
        let (storage, _temp_db) = setup_storage().await;
        let module = submodule(Arc::new(MockQuerier::default()));
        let mut conn = storage.pool().acquire().await.unwrap();

        let err = module
            .collect(&BlockBuilder::new(5).build(), &mut conn)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("block 5 was not prepared"));
    }

    #[tokio::test]
    async fn test_recollect_is_idempotent() {
        let (storage, _temp_db) = setup_storage().await;
        let module = submodule(Arc::new(MockQuerier::default()));
        let block = BlockBuilder::new(3).build();
        let mut conn = storage.pool().acquire().await.unwrap();

        for _ in 0..2 {
            module.prepare(&block).await.unwrap();
            module.collect(&block, &mut conn).await.unwrap();
        }
        drop(conn);

        assert_eq!(storage.committed_heights("rollup-1").await.unwrap(), vec![3]);
    }
}
