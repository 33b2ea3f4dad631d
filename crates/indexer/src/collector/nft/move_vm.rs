//! Move object NFT adapter.
//!
//! Tokens are objects. Mint and burn events name collection, token id and
//! object; transfers only name the object, which is resolved to a token key
//! through its `0x1::nft::Nft` resource. The initial owner of a minted token
//! comes from the object's `CreateEvent` earlier in the block.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rollscan_core::{normalize_move_address, EVENT_TYPE_MOVE};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::{CollectionMeta, NftKey, NftOp, NftTarget, NftVm};
use crate::extractor::{BlockEvents, EventMatcher};
use crate::node::{NodeQuerier, QueryError};

const OBJECT_CREATE: &str = "0x1::object::CreateEvent";
const OBJECT_TRANSFER: &str = "0x1::object::TransferEvent";
const COLLECTION_CREATE: &str = "0x1::collection::CreateCollectionEvent";
const COLLECTION_MINT: &str = "0x1::collection::MintEvent";
const COLLECTION_BURN: &str = "0x1::collection::BurnEvent";

const COLLECTION_RESOURCE: &str = "0x1::collection::Collection";
const NFT_RESOURCE: &str = "0x1::nft::Nft";

#[derive(Debug, Deserialize)]
struct CreateEvent {
    object: String,
    owner: String,
}

#[derive(Debug, Deserialize)]
struct TransferEvent {
    object: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct CreateCollectionEvent {
    collection: String,
    creator: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenEvent {
    collection: String,
    token_id: String,
    nft: String,
}

#[derive(Debug, Deserialize)]
struct CollectionResource {
    creator: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NftResource {
    collection: ObjectRef,
    token_id: String,
    #[serde(default)]
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    inner: String,
}

fn normalize(value: &str) -> Result<String> {
    Ok(normalize_move_address(value)?)
}

fn decode_resource<T: for<'de> Deserialize<'de>>(
    data: Value,
    struct_tag: &str,
) -> Result<T, QueryError> {
    serde_json::from_value(data).map_err(|e| QueryError::Decode(format!("{}: {}", struct_tag, e)))
}

/// NFTs of the Move object model.
#[derive(Debug, Default, Clone, Copy)]
pub struct MoveNft;

#[async_trait]
impl NftVm for MoveNft {
    fn name(&self) -> &'static str {
        "move_nft"
    }

    fn scan(&self, events: &BlockEvents<'_>) -> Result<Vec<NftOp>> {
        let matcher = EventMatcher::exact(EVENT_TYPE_MOVE);
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut ops = Vec::new();

        for event in events.iter(&matcher) {
            let (Some(type_tag), Some(data)) = (event.get("type_tag"), event.get("data")) else {
                continue;
            };
            let decode = || format!("Invalid {} in tx {}", type_tag, event.tx_hash);

            match type_tag {
                OBJECT_CREATE => {
                    let created: CreateEvent = serde_json::from_str(data).with_context(decode)?;
                    owners.insert(normalize(&created.object)?, normalize(&created.owner)?);
                }
                OBJECT_TRANSFER => {
                    let transfer: TransferEvent =
                        serde_json::from_str(data).with_context(decode)?;
                    ops.push(NftOp::Transfer {
                        target: NftTarget::object(normalize(&transfer.object)?),
                        to: normalize(&transfer.to)?,
                    });
                }
                COLLECTION_CREATE => {
                    let created: CreateCollectionEvent =
                        serde_json::from_str(data).with_context(decode)?;
                    ops.push(NftOp::CollectionCreated {
                        collection: normalize(&created.collection)?,
                        meta: Some(CollectionMeta {
                            name: created.name,
                            creator: Some(normalize(&created.creator)?),
                        }),
                    });
                }
                COLLECTION_MINT => {
                    let minted: TokenEvent = serde_json::from_str(data).with_context(decode)?;
                    let object = normalize(&minted.nft)?;
                    let Some(owner) = owners.get(&object).cloned() else {
                        warn!("Mint of object {} without a create event", object);
                        continue;
                    };
                    let key = NftKey::new(normalize(&minted.collection)?, minted.token_id);
                    ops.push(NftOp::Mint {
                        target: NftTarget::keyed_object(key, object),
                        owner,
                    });
                }
                COLLECTION_BURN => {
                    let burned: TokenEvent = serde_json::from_str(data).with_context(decode)?;
                    let key = NftKey::new(normalize(&burned.collection)?, burned.token_id);
                    ops.push(NftOp::Burn {
                        target: NftTarget::keyed_object(key, normalize(&burned.nft)?),
                    });
                }
                _ => {}
            }
        }

        Ok(ops)
    }

    async fn resolve_object(
        &self,
        querier: &dyn NodeQuerier,
        object: &str,
        height: i64,
    ) -> Result<NftKey, QueryError> {
        let data = querier.move_resource(object, NFT_RESOURCE, height).await?;
        let nft: NftResource = decode_resource(data, NFT_RESOURCE)?;
        let collection = normalize_move_address(&nft.collection.inner)
            .map_err(|e| QueryError::Decode(e.to_string()))?;
        Ok(NftKey::new(collection, nft.token_id))
    }

    async fn collection_metadata(
        &self,
        querier: &dyn NodeQuerier,
        collection: &str,
        height: i64,
    ) -> Result<CollectionMeta, QueryError> {
        let data = querier
            .move_resource(collection, COLLECTION_RESOURCE, height)
            .await?;
        let resource: CollectionResource = decode_resource(data, COLLECTION_RESOURCE)?;
        let creator = normalize_move_address(&resource.creator)
            .map_err(|e| QueryError::Decode(e.to_string()))?;
        Ok(CollectionMeta {
            name: resource.name,
            creator: Some(creator),
        })
    }

    async fn token_uri(
        &self,
        querier: &dyn NodeQuerier,
        _key: &NftKey,
        object: Option<&str>,
        height: i64,
    ) -> Result<Option<String>, QueryError> {
        let Some(object) = object else {
            return Ok(None);
        };
        let data = querier.move_resource(object, NFT_RESOURCE, height).await?;
        let nft: NftResource = decode_resource(data, NFT_RESOURCE)?;
        Ok(Some(nft.uri).filter(|uri| !uri.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{move_event, BlockBuilder, MockQuerier};
    use serde_json::json;

    fn addr(short: &str) -> String {
        normalize_move_address(short).unwrap()
    }

    #[test]
    fn test_scan_pairs_mint_with_create_owner() {
        let block = BlockBuilder::new(20)
            .tx("AQ==", vec![
                move_event(COLLECTION_CREATE, json!({"collection": "0xc0", "creator": "0xa", "name": "Cats"})),
                move_event(OBJECT_CREATE, json!({"object": "0x99", "owner": "0xa", "version": "1"})),
                move_event(COLLECTION_MINT, json!({"collection": "0xc0", "token_id": "cat #1", "nft": "0x99"})),
                move_event(OBJECT_TRANSFER, json!({"object": "0x99", "from": "0xa", "to": "0xb"})),
            ])
            .build();
        let events = BlockEvents::new(&block).unwrap();
        let ops = MoveNft.scan(&events).unwrap();

        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            NftOp::CollectionCreated {
                collection: addr("0xc0"),
                meta: Some(CollectionMeta {
                    name: "Cats".into(),
                    creator: Some(addr("0xa")),
                }),
            }
        );
        assert_eq!(
            ops[1],
            NftOp::Mint {
                target: NftTarget::keyed_object(NftKey::new(addr("0xc0"), "cat #1"), addr("0x99")),
                owner: addr("0xa"),
            }
        );
        assert_eq!(
            ops[2],
            NftOp::Transfer {
                target: NftTarget::object(addr("0x99")),
                to: addr("0xb"),
            }
        );
    }

    #[test]
    fn test_mint_without_create_is_skipped() {
        let block = BlockBuilder::new(20)
            .tx("AQ==", vec![move_event(
                COLLECTION_MINT,
                json!({"collection": "0xc0", "token_id": "1", "nft": "0x99"}),
            )])
            .build();
        let events = BlockEvents::new(&block).unwrap();

        assert!(MoveNft.scan(&events).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_object_reads_nft_resource() {
        let querier = MockQuerier::default();
        querier.set_move_resource(
            &addr("0x99"),
            NFT_RESOURCE,
            json!({"collection": {"inner": "0xc0"}, "token_id": "7", "uri": "ipfs://7", "description": ""}),
        );

        let key = MoveNft.resolve_object(&querier, &addr("0x99"), 5).await.unwrap();
        assert_eq!(key, NftKey::new(addr("0xc0"), "7"));

        let uri = MoveNft
            .token_uri(&querier, &key, Some(&addr("0x99")), 5)
            .await
            .unwrap();
        assert_eq!(uri.as_deref(), Some("ipfs://7"));
    }

    #[tokio::test]
    async fn test_non_nft_object_is_invalid() {
        let querier = MockQuerier::default();
        let err = MoveNft
            .resolve_object(&querier, &addr("0x42"), 5)
            .await
            .unwrap_err();
        assert!(err.is_invalid_nft());
    }
}
