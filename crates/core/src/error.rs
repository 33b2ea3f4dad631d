//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Raw transaction bytes were not valid base64.
    #[error("Invalid base64 transaction at index {index}: {reason}")]
    InvalidTxEncoding {
        /// Position of the transaction inside its block.
        index: usize,
        /// Decoder message.
        reason: String,
    },

    /// Raw transaction bytes were not a protobuf `TxRaw` with a body.
    #[error("Undecodable transaction at index {index}: {reason}")]
    InvalidTxBody {
        /// Position of the transaction inside its block.
        index: usize,
        /// Decoder message.
        reason: String,
    },

    /// The node returned a different number of results than transactions.
    #[error("Block {height} has {txs} transactions but {results} results")]
    TxResultMismatch {
        /// Block height.
        height: i64,
        /// Raw transaction count.
        txs: usize,
        /// Result count.
        results: usize,
    },

    /// A coin string could not be parsed.
    #[error("Invalid coin: {0}")]
    InvalidCoin(String),

    /// An address did not have the expected shape.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Unknown VM flavour name.
    #[error("Unknown vm type: {0} (expected evm, move or wasm)")]
    InvalidVmType(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
