//! Node metadata queries.
//!
//! Submodules use [`NodeQuerier`] during their prepare phase to resolve
//! things the events alone do not carry: validator operators, NFT
//! collection metadata, token URIs and EVM receipts. Every state query is
//! pinned to the height of the block being prepared.

use alloy::primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub mod client;
pub mod error;

pub use client::NodeClient;
pub use error::QueryError;

/// A rollup validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    /// Operator (valoper) address.
    pub operator_address: String,
    /// Human-readable name.
    pub moniker: String,
    /// Consensus address (uppercase hex), as found in block headers.
    pub consensus_address: String,
}

/// Summary of an EVM transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    /// Ethereum transaction hash.
    pub transaction_hash: B256,
    /// Index in the block.
    pub transaction_index: U64,
    /// Sender.
    pub from: Address,
    /// Recipient, absent for contract creation.
    #[serde(default)]
    pub to: Option<Address>,
    /// Created contract.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// 1 success, 0 revert.
    #[serde(default)]
    pub status: Option<U64>,
    /// Gas used by this transaction.
    pub gas_used: U64,
    /// Emitted logs.
    #[serde(default)]
    pub logs: Vec<Value>,
}

/// Read access to chain state at a given height.
#[async_trait]
pub trait NodeQuerier: Send + Sync + 'static {
    /// `data` of the Move resource `struct_tag` stored at `address`.
    async fn move_resource(
        &self,
        address: &str,
        struct_tag: &str,
        height: i64,
    ) -> Result<Value, QueryError>;

    /// CosmWasm smart query against `contract`.
    async fn wasm_smart_query(
        &self,
        contract: &str,
        query: &Value,
        height: i64,
    ) -> Result<Value, QueryError>;

    /// `eth_call` of `data` against `to`.
    async fn eth_call(&self, to: Address, data: Bytes, height: i64) -> Result<Bytes, QueryError>;

    /// Current validator set.
    async fn validators(&self) -> Result<Vec<ValidatorInfo>, QueryError>;

    /// Receipts of every EVM transaction in the block at `height`.
    async fn evm_block_receipts(&self, height: i64) -> Result<Vec<EvmReceipt>, QueryError>;
}
