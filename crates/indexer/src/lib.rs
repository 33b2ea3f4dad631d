//! Block ingestion for Cosmos-SDK rollups.
//!
//! This crate provides:
//! - A scraper that pulls blocks and execution results from CometBFT RPC
//! - An orchestrator that prepares blocks out of order and commits them in
//!   height order, with backpressure on the scraper
//! - A collector that runs block, transaction and NFT submodules inside one
//!   SQLite transaction per block
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  rollscan-indexer                          │
//! │                                            │
//! │  ┌─────────────┐   block queue             │
//! │  │   Scraper   │ ← CometBFT RPC            │
//! │  │ fast / slow │──────────┐                │
//! │  └──────▲──────┘          │                │
//! │         │ pause/resume    ▼                │
//! │  ┌──────┴───────────────────────┐          │
//! │  │        Orchestrator          │          │
//! │  │ prepare (concurrent)         │ ← REST / │
//! │  │ stage → commit (in order)    │ JSON-RPC │
//! │  └──────────────┬───────────────┘          │
//! │                 │                          │
//! │          ┌──────▼──────┐                   │
//! │          │  Collector  │                   │
//! │          │ block / tx  │                   │
//! │          │ nft (vm)    │                   │
//! │          └──────┬──────┘                   │
//! │                 │                          │
//! │          ┌──────▼──────┐   ┌───────────┐   │
//! │          │   Storage   │──▶│ Notifier  │   │
//! │          │  (SQLite)   │   └───────────┘   │
//! │          └─────────────┘                   │
//! └────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod collector;
pub mod config;
pub mod extractor;
pub mod node;
pub mod notifier;
pub mod orchestrator;
pub mod scraper;
pub mod storage;
pub mod test_utils;

pub use collector::{Collector, Submodule};
pub use config::Config;
pub use notifier::{BlockNotification, BlockNotifier, LoggingNotifier};
pub use orchestrator::Orchestrator;
pub use storage::Storage;

pub use rollscan_core::{types::*, *};
