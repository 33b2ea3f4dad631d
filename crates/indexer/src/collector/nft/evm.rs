//! ERC-721 adapter.
//!
//! The EVM module emits one `evm` event per log with the log JSON in the
//! `log` attribute. ERC-721 `Transfer` carries the token id as a third
//! indexed topic; ERC-20 `Transfer` has the same signature with only two
//! indexed topics and fails to decode here.

use alloy::primitives::{Address, Bytes, Log, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rollscan_core::EVENT_TYPE_EVM;
use serde::Deserialize;
use std::str::FromStr;

use super::{CollectionMeta, NftKey, NftOp, NftTarget, NftVm};
use crate::extractor::{BlockEvents, EventMatcher};
use crate::node::{NodeQuerier, QueryError};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC721Metadata {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function name() external view returns (string);
        function owner() external view returns (address);
        function tokenURI(uint256 tokenId) external view returns (string);
    }
}

use IERC721Metadata::{nameCall, ownerCall, tokenURICall, Transfer};

/// A log as the EVM module renders it into event attributes.
#[derive(Debug, Deserialize)]
struct EventLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

fn format_address(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

fn parse_address(value: &str) -> Result<Address, QueryError> {
    Address::from_str(value).map_err(|e| QueryError::Decode(format!("{}: {}", value, e)))
}

/// ERC-721 over EVM logs and `eth_call`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmNft;

impl EvmNft {
    fn decode(log: &EventLog) -> Option<NftOp> {
        if log.topics.len() != 4 {
            return None;
        }
        let log = Log::new(log.address, log.topics.clone(), log.data.clone())?;
        let transfer = Transfer::decode_log(&log, true).ok()?;

        let key = NftKey::new(
            format_address(transfer.address),
            transfer.tokenId.to_string(),
        );
        let target = NftTarget::key(key);
        let op = if transfer.from == Address::ZERO {
            NftOp::Mint {
                target,
                owner: format_address(transfer.to),
            }
        } else if transfer.to == Address::ZERO {
            NftOp::Burn { target }
        } else {
            NftOp::Transfer {
                target,
                to: format_address(transfer.to),
            }
        };
        Some(op)
    }

    async fn call<C: SolCall + Send + Sync>(
        querier: &dyn NodeQuerier,
        to: &str,
        call: C,
        height: i64,
    ) -> Result<C::Return, QueryError> {
        let output = querier
            .eth_call(parse_address(to)?, call.abi_encode().into(), height)
            .await?;
        C::abi_decode_returns(output.as_ref(), true).map_err(|e| QueryError::Abi(e.to_string()))
    }
}

#[async_trait]
impl NftVm for EvmNft {
    fn name(&self) -> &'static str {
        "evm_nft"
    }

    fn scan(&self, events: &BlockEvents<'_>) -> Result<Vec<NftOp>> {
        let mut ops = Vec::new();
        for event in events.iter(&EventMatcher::exact(EVENT_TYPE_EVM)) {
            let Some(raw) = event.get("log") else {
                continue;
            };
            let log: EventLog = serde_json::from_str(raw)
                .with_context(|| format!("Invalid evm log in tx {}", event.tx_hash))?;
            ops.extend(Self::decode(&log));
        }
        Ok(ops)
    }

    async fn collection_metadata(
        &self,
        querier: &dyn NodeQuerier,
        collection: &str,
        height: i64,
    ) -> Result<CollectionMeta, QueryError> {
        let name = Self::call(querier, collection, nameCall {}, height).await?._0;
        let creator = match Self::call(querier, collection, ownerCall {}, height).await {
            Ok(owner) => Some(format_address(owner._0)),
            Err(e) if e.is_invalid_nft() => None,
            Err(e) => return Err(e),
        };
        Ok(CollectionMeta { name, creator })
    }

    async fn token_uri(
        &self,
        querier: &dyn NodeQuerier,
        key: &NftKey,
        _object: Option<&str>,
        height: i64,
    ) -> Result<Option<String>, QueryError> {
        let token_id = U256::from_str(&key.token_id)
            .map_err(|e| QueryError::Decode(format!("token id {}: {}", key.token_id, e)))?;
        let uri = Self::call(querier, &key.collection, tokenURICall { tokenId: token_id }, height)
            .await?
            ._0;
        Ok(Some(uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{transfer_log, BlockBuilder, MockQuerier};
    use alloy::primitives::address;
    use rollscan_core::Event;

    const COLLECTION: Address = address!("0000000000000000000000000000000000000abc");
    const OWNER: Address = address!("0000000000000000000000000000000000000def");

    fn evm_event(log: String) -> Event {
        Event::new("evm", [("log", log)])
    }

    #[test]
    fn test_scan_classifies_mint_transfer_burn() {
        let block = BlockBuilder::new(100)
            .tx("AQ==", vec![
                evm_event(transfer_log(COLLECTION, Address::ZERO, OWNER, 1)),
                evm_event(transfer_log(COLLECTION, OWNER, Address::repeat_byte(7), 1)),
                evm_event(transfer_log(COLLECTION, Address::repeat_byte(7), Address::ZERO, 1)),
            ])
            .build();
        let events = BlockEvents::new(&block).unwrap();
        let ops = EvmNft.scan(&events).unwrap();

        let key = NftKey::new(format_address(COLLECTION), "1");
        assert_eq!(
            ops,
            vec![
                NftOp::Mint {
                    target: NftTarget::key(key.clone()),
                    owner: "0x0000000000000000000000000000000000000def".into(),
                },
                NftOp::Transfer {
                    target: NftTarget::key(key.clone()),
                    to: format_address(Address::repeat_byte(7)),
                },
                NftOp::Burn {
                    target: NftTarget::key(key),
                },
            ]
        );
    }

    #[test]
    fn test_scan_skips_erc20_transfer() {
        let erc20 = serde_json::json!({
            "address": format_address(COLLECTION),
            "topics": [Transfer::SIGNATURE_HASH, OWNER.into_word(), COLLECTION.into_word()],
            "data": format!("0x{}", hex::encode(U256::from(5).to_be_bytes::<32>())),
        });
        let block = BlockBuilder::new(1)
            .tx("AQ==", vec![evm_event(erc20.to_string())])
            .build();
        let events = BlockEvents::new(&block).unwrap();

        assert!(EvmNft.scan(&events).unwrap().is_empty());
    }

    #[test]
    fn test_scan_rejects_malformed_log() {
        let block = BlockBuilder::new(1)
            .tx("AQ==", vec![evm_event("not json".into())])
            .build();
        let events = BlockEvents::new(&block).unwrap();

        assert!(EvmNft.scan(&events).is_err());
    }

    #[tokio::test]
    async fn test_collection_metadata_with_optional_owner() {
        let querier = MockQuerier::default();
        querier.set_eth_call(COLLECTION, nameCall {}, "Apes".to_string());

        let meta = EvmNft
            .collection_metadata(&querier, &format_address(COLLECTION), 100)
            .await
            .unwrap();
        assert_eq!(meta.name, "Apes");
        assert_eq!(meta.creator, None);

        querier.set_eth_call(COLLECTION, ownerCall {}, OWNER);
        let meta = EvmNft
            .collection_metadata(&querier, &format_address(COLLECTION), 100)
            .await
            .unwrap();
        assert_eq!(meta.creator.as_deref(), Some("0x0000000000000000000000000000000000000def"));
    }

    #[tokio::test]
    async fn test_non_erc721_contract_is_invalid() {
        let querier = MockQuerier::default();
        let err = EvmNft
            .collection_metadata(&querier, &format_address(COLLECTION), 100)
            .await
            .unwrap_err();
        assert!(err.is_invalid_nft());
    }
}
