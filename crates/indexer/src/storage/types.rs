//! Database record types.

use serde::{Deserialize, Serialize};

/// A committed block row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Block height
    pub height: i64,

    /// Block hash (uppercase hex)
    pub hash: String,

    /// Header time in unix millis
    pub timestamp: i64,

    /// Millis since the previous block, `None` when the previous row is absent
    pub block_time: Option<i64>,

    /// Validator operator address, or consensus address when unresolved
    pub proposer: String,

    /// Aggregated fees as JSON `[{denom, amount}]`
    pub total_fee: String,

    /// Number of transactions in the block
    pub tx_count: i64,

    /// Sum of gas used across transactions
    pub gas_used: i64,

    /// Sum of gas wanted across transactions
    pub gas_wanted: i64,
}

/// A transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Transaction hash (uppercase hex)
    pub hash: String,

    /// Block height
    pub height: i64,

    /// Global, gap-free sequence number
    pub sequence: i64,

    /// Position inside the block
    pub tx_index: i64,

    /// ABCI result code
    pub code: i64,

    /// Failure codespace
    pub codespace: String,

    /// Gas used
    pub gas_used: i64,

    /// Gas wanted
    pub gas_wanted: i64,

    /// First `message.sender`, if any
    pub signer: Option<String>,

    /// Block time in unix millis
    pub timestamp: i64,

    /// JSON payload (raw tx, decoded body or null, log, events)
    pub payload: String,
}

/// Link between an account and a transaction it took part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTxRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Account address as it appeared in events (normalized)
    pub account: String,

    /// Transaction hash
    pub tx_hash: String,

    /// Block height
    pub height: i64,

    /// Per-chain, gap-free sequence number
    pub sequence: i64,

    /// Whether the account signed the transaction
    pub signer: bool,
}

/// An NFT collection row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftCollectionRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Collection address (contract or object)
    pub addr: String,

    /// Collection name
    pub name: String,

    /// Creator or minter, when known
    pub creator: Option<String>,

    /// Height at which the collection was first seen
    pub height: i64,

    /// Block time in unix millis
    pub timestamp: i64,

    /// Live NFT count
    pub nft_count: i64,
}

/// A live NFT row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Owning collection address
    pub collection_addr: String,

    /// Token identifier inside the collection
    pub token_id: String,

    /// Object address (Move only)
    pub object_addr: Option<String>,

    /// Current owner
    pub owner: String,

    /// Token URI, when resolvable
    pub token_uri: Option<String>,

    /// Height of the last mint or transfer
    pub height: i64,

    /// Block time of the last mint or transfer, unix millis
    pub timestamp: i64,
}

/// A Move fungible-asset store and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaStoreRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Store object address
    pub store_addr: String,

    /// Owner account
    pub owner: String,

    /// Height at which the store was first seen
    pub height: i64,
}

/// An EVM transaction receipt summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTxRecord {
    /// Chain identifier
    pub chain_id: String,

    /// Ethereum transaction hash (lowercase 0x hex)
    pub hash: String,

    /// Block height
    pub height: i64,

    /// Position inside the block
    pub tx_index: i64,

    /// Sender
    pub from_addr: String,

    /// Recipient, `None` for contract creation
    pub to_addr: Option<String>,

    /// Created contract, if any
    pub contract_address: Option<String>,

    /// 1 on success, 0 on revert
    pub status: i64,

    /// Gas used
    pub gas_used: i64,

    /// Number of emitted logs
    pub log_count: i64,
}
