//! # rollscan core
//!
//! Canonical types shared by every stage of the rollscan ingestion pipeline.
//!
//! The scraper decodes node responses into [`ScrapedBlock`]s, the extractor
//! flattens their events into [`ParsedEvent`]s, and the collector submodules
//! derive durable records from both. Nothing in this crate performs I/O.
//!
//! ## Modules
//!
//! - **types**: blocks, transaction results, events, VM flavour
//! - **hashing**: transaction hashes and validator consensus addresses
//! - **tx**: transaction envelope decoding
//! - **address**: account and object address normalization
//! - **coin**: coin string parsing and per-denom aggregation
//! - **constants**: event types, attribute keys and sequence names

#![warn(missing_docs)]

pub mod address;
pub mod coin;
pub mod constants;
pub mod error;
pub mod hashing;
pub mod tx;
pub mod types;

pub use address::{is_bech32_account, normalize_evm_address, normalize_move_address};
pub use coin::{Coin, CoinTotals};
pub use constants::*;
pub use error::{CoreError, Result};
pub use hashing::{consensus_address, tx_hash};
pub use tx::{decode_tx, encode_tx, DecodedMsg, DecodedTx};
pub use types::*;
