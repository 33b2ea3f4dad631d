//! Event extraction from scraped blocks.
//!
//! [`BlockEvents`] hashes every transaction once and then hands out lazy
//! iterators over the block's events in source order: pre-block,
//! begin-block, each transaction in block order, end-block.

use rollscan_core::{CoreError, Event, ParsedEvent, ScrapedBlock};
use std::collections::BTreeMap;

/// Which events an iteration yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMatcher {
    /// Every event.
    Any,
    /// Events whose type is one of the listed types.
    Exact(Vec<String>),
    /// Events whose type starts with the prefix.
    Prefix(String),
}

impl EventMatcher {
    /// Match a single event type.
    pub fn exact(ty: impl Into<String>) -> Self {
        Self::Exact(vec![ty.into()])
    }

    /// Whether an event of type `ty` is selected.
    pub fn matches(&self, ty: &str) -> bool {
        match self {
            EventMatcher::Any => true,
            EventMatcher::Exact(types) => types.iter().any(|t| t == ty),
            EventMatcher::Prefix(prefix) => ty.starts_with(prefix.as_str()),
        }
    }
}

/// A block together with its transaction hashes.
#[derive(Debug, Clone)]
pub struct BlockEvents<'a> {
    block: &'a ScrapedBlock,
    tx_hashes: Vec<String>,
}

impl<'a> BlockEvents<'a> {
    /// Hash the block's transactions.
    ///
    /// Fails if any transaction is not valid base64 or the result list does
    /// not line up with the transaction list.
    pub fn new(block: &'a ScrapedBlock) -> Result<Self, CoreError> {
        if block.txs.len() != block.tx_results.len() {
            return Err(CoreError::TxResultMismatch {
                height: block.height,
                txs: block.txs.len(),
                results: block.tx_results.len(),
            });
        }

        let tx_hashes = block
            .txs
            .iter()
            .enumerate()
            .map(|(index, raw)| rollscan_core::tx_hash(raw, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { block, tx_hashes })
    }

    /// The underlying block.
    pub fn block(&self) -> &'a ScrapedBlock {
        self.block
    }

    /// Transaction hashes in block order.
    pub fn tx_hashes(&self) -> &[String] {
        &self.tx_hashes
    }

    /// Iterate matching events. Each call starts from the beginning.
    pub fn iter<'s>(&'s self, matcher: &'s EventMatcher) -> impl Iterator<Item = ParsedEvent> + 's {
        let block: &'s ScrapedBlock = self.block;
        let no_tx: &'s str = "";
        let block_level =
            move |events: &'s [Event]| events.iter().map(move |event| (no_tx, event));

        let tx_level = block
            .tx_results
            .iter()
            .zip(self.tx_hashes.iter())
            .flat_map(|(result, hash)| {
                result
                    .events
                    .iter()
                    .map(move |event| (hash.as_str(), event))
            });

        block_level(block.pre_block_events.as_slice())
            .chain(block_level(block.begin_block_events.as_slice()))
            .chain(tx_level)
            .chain(block_level(block.end_block_events.as_slice()))
            .filter(move |(_, event)| matcher.matches(&event.ty))
            .map(|(tx_hash, event)| parse_event(tx_hash, event))
    }
}

fn parse_event(tx_hash: &str, event: &Event) -> ParsedEvent {
    let attributes = event
        .attributes
        .iter()
        .map(|attr| (attr.key.clone(), attr.value.clone()))
        .collect::<BTreeMap<_, _>>();

    ParsedEvent {
        tx_hash: tx_hash.to_string(),
        ty: event.ty.clone(),
        attributes,
    }
}
