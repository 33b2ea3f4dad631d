//! Core types for rollscan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Virtual machine flavour of the indexed rollup.
///
/// Selects which NFT reconciler the collector runs and which extra
/// per-transaction enrichment applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    /// minievm: ERC-721 logs, `eth_call` metadata.
    Evm,
    /// minimove: object events, resource metadata.
    Move,
    /// miniwasm: CW721 attributes, smart-query metadata.
    Wasm,
}

impl VmType {
    /// Lowercase name as used in configuration files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            VmType::Evm => "evm",
            VmType::Move => "move",
            VmType::Wasm => "wasm",
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VmType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" => Ok(VmType::Evm),
            "move" => Ok(VmType::Move),
            "wasm" => Ok(VmType::Wasm),
            _ => Err(CoreError::InvalidVmType(s.to_string())),
        }
    }
}

/// A single key/value attribute of an ABCI event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value (plain text since CometBFT 0.37).
    #[serde(default)]
    pub value: String,
}

/// An ABCI event as emitted by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `transfer` or `move`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Ordered attributes; keys may repeat.
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Build an event from `(key, value)` pairs.
    pub fn new<K, V>(ty: impl Into<String>, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            ty: ty.into(),
            attributes: attributes
                .into_iter()
                .map(|(key, value)| EventAttribute {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    /// First value for `key`, if any.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }
}

/// Execution result of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// ABCI result code (0 = success).
    pub code: u32,
    /// Module namespace of a failure code.
    #[serde(default)]
    pub codespace: String,
    /// Raw log emitted by the node.
    #[serde(default)]
    pub log: String,
    /// Gas requested by the transaction.
    pub gas_wanted: i64,
    /// Gas consumed during execution.
    pub gas_used: i64,
    /// Events emitted during execution, in order.
    #[serde(default)]
    pub events: Vec<Event>,
}

/// A block as scraped from the node, before any derivation.
///
/// Immutable once built. Transactions are kept in the base64 form the node
/// serves them in; hashing decodes them lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedBlock {
    /// Chain the block belongs to.
    pub chain_id: String,
    /// Block height.
    pub height: i64,
    /// Header time.
    pub timestamp: DateTime<Utc>,
    /// Block hash (uppercase hex).
    pub hash: String,
    /// Proposer consensus address (uppercase hex).
    pub proposer: String,
    /// Raw transactions, base64 encoded.
    pub txs: Vec<String>,
    /// Execution results, index-aligned with `txs`.
    pub tx_results: Vec<TxResult>,
    /// Events emitted before begin-block (ABCI++ pre-block).
    pub pre_block_events: Vec<Event>,
    /// Events emitted at begin-block.
    pub begin_block_events: Vec<Event>,
    /// Events emitted at end-block.
    pub end_block_events: Vec<Event>,
}

impl ScrapedBlock {
    /// Header time as unix milliseconds.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// One flattened event, tagged with the transaction that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    /// Hash of the owning transaction; empty for block-level events.
    pub tx_hash: String,
    /// Event type.
    pub ty: String,
    /// Attributes keyed by name (the last value wins on repeated keys).
    pub attributes: BTreeMap<String, String>,
}

impl ParsedEvent {
    /// Value of attribute `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Whether this event came from block-level execution.
    pub fn is_block_level(&self) -> bool {
        self.tx_hash.is_empty()
    }
}
