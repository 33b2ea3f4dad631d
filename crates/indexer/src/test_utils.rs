//! In-memory stand-ins for the node, used by unit and integration tests.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use rollscan_core::{Event, ScrapedBlock, TxResult, VmType};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{
    CacheConfig, ChainConfig, Config, DatabaseConfig, LoggingConfig, NodeConfig,
    OrchestratorConfig, ScraperConfig,
};
use crate::node::{EvmReceipt, NodeQuerier, QueryError, ValidatorInfo};
use crate::scraper::{BlockSource, ScrapeError};

/// Chain id every builder and mock defaults to.
pub const TEST_CHAIN_ID: &str = "rollup-1";

/// Configuration with short timings for a Move rollup.
pub fn test_config() -> Config {
    test_config_for(VmType::Move)
}

/// Configuration with short timings for the given VM.
pub fn test_config_for(vm: VmType) -> Config {
    Config {
        chain: ChainConfig {
            chain_id: TEST_CHAIN_ID.into(),
            vm,
            account_prefix: "init".into(),
        },
        node: NodeConfig {
            rpc_url: "http://localhost:26657".into(),
            rest_url: "http://localhost:1317".into(),
            json_rpc_url: Some("http://localhost:8545".into()),
            timeout_secs: 1,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 5,
            min_connections: 1,
        },
        scraper: ScraperConfig {
            start_height: 1,
            max_retries: 5,
            cooling_ms: 1,
            fetch_interval_ms: 1,
            window_size: 5,
            queue_capacity: 100,
        },
        orchestrator: OrchestratorConfig {
            pause_threshold: 100,
            resume_threshold: 50,
            cooling_ms: 1,
        },
        cache: CacheConfig::default(),
        logging: LoggingConfig::default(),
    }
}

/// `log` attribute value of an ERC-721 `Transfer`.
pub fn transfer_log(collection: Address, from: Address, to: Address, token_id: u64) -> String {
    let topics = [
        keccak256("Transfer(address,address,uint256)"),
        from.into_word(),
        to.into_word(),
        B256::from(U256::from(token_id).to_be_bytes::<32>()),
    ];
    serde_json::json!({
        "address": format!("0x{}", hex::encode(collection.as_slice())),
        "topics": topics,
        "data": "0x",
    })
    .to_string()
}

/// `move` event with a JSON `data` attribute.
pub fn move_event(type_tag: &str, data: Value) -> Event {
    Event::new("move", [("type_tag", type_tag.to_string()), ("data", data.to_string())])
}

/// Builds [`ScrapedBlock`]s.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    block: ScrapedBlock,
}

impl BlockBuilder {
    /// Empty block at `height`, one second after the previous height.
    pub fn new(height: i64) -> Self {
        let genesis = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
        let timestamp = genesis.unwrap_or_default() + ChronoDuration::seconds(height);
        Self {
            block: ScrapedBlock {
                chain_id: TEST_CHAIN_ID.into(),
                height,
                timestamp,
                hash: format!("{:064X}", height),
                proposer: "PROPOSER".into(),
                txs: Vec::new(),
                tx_results: Vec::new(),
                pre_block_events: Vec::new(),
                begin_block_events: Vec::new(),
                end_block_events: Vec::new(),
            },
        }
    }

    /// Override the chain id.
    pub fn chain_id(mut self, chain_id: &str) -> Self {
        self.block.chain_id = chain_id.into();
        self
    }

    /// Override the header time.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.block.timestamp = timestamp;
        self
    }

    /// Override the proposer consensus address.
    pub fn proposer(mut self, proposer: &str) -> Self {
        self.block.proposer = proposer.into();
        self
    }

    /// Append a successful transaction.
    pub fn tx(self, raw: &str, events: Vec<Event>) -> Self {
        self.tx_with_gas(raw, events, 0, 0)
    }

    /// Append a successful transaction with gas figures.
    pub fn tx_with_gas(
        mut self,
        raw: &str,
        events: Vec<Event>,
        gas_wanted: i64,
        gas_used: i64,
    ) -> Self {
        self.block.txs.push(raw.into());
        self.block.tx_results.push(TxResult {
            code: 0,
            codespace: String::new(),
            log: String::new(),
            gas_wanted,
            gas_used,
            events,
        });
        self
    }

    /// Append a pre-block event.
    pub fn pre_block_event(mut self, event: Event) -> Self {
        self.block.pre_block_events.push(event);
        self
    }

    /// Append a begin-block event.
    pub fn begin_block_event(mut self, event: Event) -> Self {
        self.block.begin_block_events.push(event);
        self
    }

    /// Append an end-block event.
    pub fn end_block_event(mut self, event: Event) -> Self {
        self.block.end_block_events.push(event);
        self
    }

    /// Finish.
    pub fn build(self) -> ScrapedBlock {
        self.block
    }
}

/// A fake chain serving empty (or preset) blocks up to a movable head.
#[derive(Debug)]
pub struct MockChain {
    chain_id: String,
    head: AtomicI64,
    blocks: Mutex<HashMap<i64, ScrapedBlock>>,
    failures: Mutex<HashMap<i64, u32>>,
    corrupt: Mutex<HashSet<i64>>,
    delays: Mutex<HashMap<i64, Duration>>,
    fetches: Mutex<HashMap<i64, u32>>,
}

impl MockChain {
    /// Chain whose latest block is `head`.
    pub fn new(chain_id: &str, head: i64) -> Self {
        Self {
            chain_id: chain_id.into(),
            head: AtomicI64::new(head),
            blocks: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            corrupt: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `block` at its height instead of an empty block.
    pub fn insert_block(&self, block: ScrapedBlock) {
        self.blocks.lock().insert(block.height, block);
    }

    /// Fail the next `times` fetches of `height` with a transport error.
    pub fn fail_times(&self, height: i64, times: u32) {
        self.failures.lock().insert(height, times);
    }

    /// Serve an undecodable payload at `height`.
    pub fn corrupt(&self, height: i64) {
        self.corrupt.lock().insert(height);
    }

    /// Answer fetches of `height` only after `delay`.
    pub fn delay(&self, height: i64, delay: Duration) {
        self.delays.lock().insert(height, delay);
    }

    /// Move the head.
    pub fn set_head(&self, head: i64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Number of fetch attempts for `height`.
    pub fn fetch_count(&self, height: i64) -> u32 {
        self.fetches.lock().get(&height).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn fetch_block(&self, height: i64) -> Result<ScrapedBlock, ScrapeError> {
        *self.fetches.lock().entry(height).or_insert(0) += 1;

        let delay = self.delays.lock().get(&height).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let head = self.head.load(Ordering::SeqCst);
        if height > head {
            return Err(ScrapeError::from_node_message(
                height,
                format!(
                    "height {} must be less than or equal to the current blockchain height {}",
                    height, head
                ),
            ));
        }

        if self.corrupt.lock().contains(&height) {
            return Err(ScrapeError::Decode {
                height,
                message: "invalid type: integer, expected a string".into(),
            });
        }

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&height).filter(|r| **r > 0) {
                *remaining -= 1;
                return Err(ScrapeError::Transport {
                    height,
                    message: "connection reset by peer".into(),
                });
            }
        }

        let preset = self.blocks.lock().get(&height).cloned();
        Ok(preset.unwrap_or_else(|| BlockBuilder::new(height).chain_id(&self.chain_id).build()))
    }
}

/// A fake node answering metadata queries from preset tables.
///
/// Unknown EVM calls revert, unknown Move resources are 404s and unknown
/// Wasm contracts fail with "no such contract", which is how real nodes
/// answer for addresses that are not NFTs.
#[derive(Debug, Default)]
pub struct MockQuerier {
    validators: Mutex<Vec<ValidatorInfo>>,
    validators_fail: AtomicBool,
    validator_calls: AtomicUsize,
    receipts: Mutex<HashMap<i64, Vec<EvmReceipt>>>,
    eth_calls: Mutex<HashMap<(Address, Bytes), Bytes>>,
    move_resources: Mutex<HashMap<(String, String), Value>>,
    wasm_queries: Mutex<HashMap<(String, String), Value>>,
    failing: Mutex<HashMap<String, QueryError>>,
    queries: AtomicUsize,
}

impl MockQuerier {
    /// Validator set returned by `validators`.
    pub fn set_validators(&self, validators: Vec<ValidatorInfo>) {
        *self.validators.lock() = validators;
    }

    /// Make `validators` fail with a transport error.
    pub fn fail_validators(&self) {
        self.validators_fail.store(true, Ordering::SeqCst);
    }

    /// Let validator loads succeed again.
    pub fn recover_validators(&self) {
        self.validators_fail.store(false, Ordering::SeqCst);
    }

    /// Number of `validators` calls.
    pub fn validator_calls(&self) -> usize {
        self.validator_calls.load(Ordering::SeqCst)
    }

    /// Receipts returned for `height`.
    pub fn set_receipts(&self, height: i64, receipts: Vec<EvmReceipt>) {
        self.receipts.lock().insert(height, receipts);
    }

    /// Answer `call` against `to` with the ABI encoding of `ret`.
    pub fn set_eth_call<C: SolCall, R: SolValue>(&self, to: Address, call: C, ret: R) {
        self.eth_calls
            .lock()
            .insert((to, Bytes::from(call.abi_encode())), Bytes::from(ret.abi_encode()));
    }

    /// Answer the Move resource `struct_tag` at `address`.
    pub fn set_move_resource(&self, address: &str, struct_tag: &str, data: Value) {
        self.move_resources
            .lock()
            .insert((address.to_string(), struct_tag.to_string()), data);
    }

    /// Answer the smart query `query` against `contract`.
    pub fn set_wasm_query(&self, contract: &str, query: Value, response: Value) {
        self.wasm_queries
            .lock()
            .insert((contract.to_string(), query.to_string()), response);
    }

    /// Fail every query against `address` with `error`.
    pub fn fail_address(&self, address: &str, error: QueryError) {
        self.failing.lock().insert(address.to_string(), error);
    }

    /// Number of metadata queries answered or failed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_failing(&self, address: &str) -> Result<(), QueryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.failing.lock().get(address) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NodeQuerier for MockQuerier {
    async fn move_resource(
        &self,
        address: &str,
        struct_tag: &str,
        _height: i64,
    ) -> Result<Value, QueryError> {
        self.check_failing(address)?;
        self.move_resources
            .lock()
            .get(&(address.to_string(), struct_tag.to_string()))
            .cloned()
            .ok_or_else(|| QueryError::Status {
                status: 404,
                body: format!("resource {} not found", struct_tag),
            })
    }

    async fn wasm_smart_query(
        &self,
        contract: &str,
        query: &Value,
        _height: i64,
    ) -> Result<Value, QueryError> {
        self.check_failing(contract)?;
        self.wasm_queries
            .lock()
            .get(&(contract.to_string(), query.to_string()))
            .cloned()
            .ok_or_else(|| QueryError::Status {
                status: 500,
                body: format!("no such contract: {}", contract),
            })
    }

    async fn eth_call(&self, to: Address, data: Bytes, _height: i64) -> Result<Bytes, QueryError> {
        self.check_failing(&format!("0x{}", hex::encode(to.as_slice())))?;
        self.eth_calls
            .lock()
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| QueryError::Node("execution reverted".into()))
    }

    async fn validators(&self) -> Result<Vec<ValidatorInfo>, QueryError> {
        self.validator_calls.fetch_add(1, Ordering::SeqCst);
        if self.validators_fail.load(Ordering::SeqCst) {
            return Err(QueryError::Transport("connection refused".into()));
        }
        Ok(self.validators.lock().clone())
    }

    async fn evm_block_receipts(&self, height: i64) -> Result<Vec<EvmReceipt>, QueryError> {
        Ok(self
            .receipts
            .lock()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}
