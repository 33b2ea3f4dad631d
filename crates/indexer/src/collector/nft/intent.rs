//! Per-block NFT intents.
//!
//! Events are folded into three maps in event order. Within a block the last
//! operation on a key wins, and a burn cancels every earlier mint or
//! transfer of the same key.

use std::collections::{BTreeMap, BTreeSet};

/// Identity of a token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NftKey {
    /// Collection address.
    pub collection: String,
    /// Token id inside the collection.
    pub token_id: String,
}

impl NftKey {
    /// Build a key.
    pub fn new(collection: impl Into<String>, token_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            token_id: token_id.into(),
        }
    }
}

/// Which token an operation refers to.
///
/// Move transfers only name the token's object; its key is resolved later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftTarget {
    /// Token key, when the event carries it.
    pub key: Option<NftKey>,
    /// Token object address (Move).
    pub object: Option<String>,
}

impl NftTarget {
    /// Target addressed by key.
    pub fn key(key: NftKey) -> Self {
        Self {
            key: Some(key),
            object: None,
        }
    }

    /// Target addressed by object only.
    pub fn object(object: impl Into<String>) -> Self {
        Self {
            key: None,
            object: Some(object.into()),
        }
    }

    /// Target carrying both key and object.
    pub fn keyed_object(key: NftKey, object: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            object: Some(object.into()),
        }
    }
}

/// Collection name and creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMeta {
    /// Display name.
    pub name: String,
    /// Creator or minter.
    pub creator: Option<String>,
}

/// One NFT-relevant event, as understood by a VM adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NftOp {
    /// A collection was created; `meta` is set when the event carries it.
    CollectionCreated {
        /// Collection address.
        collection: String,
        /// Metadata found in the event itself.
        meta: Option<CollectionMeta>,
    },
    /// A token was minted to `owner`.
    Mint {
        /// Minted token.
        target: NftTarget,
        /// Initial owner.
        owner: String,
    },
    /// A token changed hands.
    Transfer {
        /// Transferred token.
        target: NftTarget,
        /// New owner.
        to: String,
    },
    /// A token was destroyed.
    Burn {
        /// Burned token.
        target: NftTarget,
    },
}

impl NftOp {
    /// The token this operation refers to, if any.
    pub fn target(&self) -> Option<&NftTarget> {
        match self {
            NftOp::CollectionCreated { .. } => None,
            NftOp::Mint { target, .. } | NftOp::Transfer { target, .. } | NftOp::Burn { target } => {
                Some(target)
            }
        }
    }
}

/// A pending mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintIntent {
    /// Initial owner.
    pub owner: String,
    /// Token object (Move).
    pub object: Option<String>,
    /// The mint follows a burn of the same key in this block, so any stored
    /// row is stale and must be overwritten.
    pub replaces: bool,
}

/// A pending transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    /// New owner.
    pub to: String,
    /// Token object (Move).
    pub object: Option<String>,
}

/// The folded effect of a block's NFT operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentMap {
    /// Collections created in this block.
    pub created: BTreeMap<String, Option<CollectionMeta>>,
    /// Tokens to insert.
    pub mints: BTreeMap<NftKey, MintIntent>,
    /// Tokens whose owner changes.
    pub transfers: BTreeMap<NftKey, TransferIntent>,
    /// Tokens to delete.
    pub burns: BTreeSet<NftKey>,
}

impl IntentMap {
    /// Fold one operation whose key is already resolved.
    pub fn apply(&mut self, key: Option<NftKey>, op: NftOp) {
        match (op, key) {
            (NftOp::CollectionCreated { collection, meta }, _) => {
                let entry = self.created.entry(collection).or_insert(None);
                if meta.is_some() {
                    *entry = meta;
                }
            }
            (NftOp::Mint { target, owner }, Some(key)) => {
                let replaces = self.burns.remove(&key)
                    || self.mints.get(&key).is_some_and(|mint| mint.replaces);
                self.mints.insert(
                    key,
                    MintIntent {
                        owner,
                        object: target.object,
                        replaces,
                    },
                );
            }
            (NftOp::Transfer { target, to }, Some(key)) => {
                self.burns.remove(&key);
                self.transfers.insert(
                    key,
                    TransferIntent {
                        to,
                        object: target.object,
                    },
                );
            }
            (NftOp::Burn { .. }, Some(key)) => {
                self.mints.remove(&key);
                self.transfers.remove(&key);
                self.burns.insert(key);
            }
            (_, None) => {}
        }
    }

    /// Every collection this block touches.
    pub fn touched_collections(&self) -> BTreeSet<String> {
        self.created
            .keys()
            .cloned()
            .chain(self.mints.keys().map(|k| k.collection.clone()))
            .chain(self.transfers.keys().map(|k| k.collection.clone()))
            .chain(self.burns.iter().map(|k| k.collection.clone()))
            .collect()
    }

    /// Whether the block has no NFT effect.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.mints.is_empty()
            && self.transfers.is_empty()
            && self.burns.is_empty()
    }
}
