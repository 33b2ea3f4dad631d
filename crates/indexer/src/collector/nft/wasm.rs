//! CW721 adapter.

use anyhow::Result;
use async_trait::async_trait;
use rollscan_core::EVENT_TYPE_WASM;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{CollectionMeta, NftKey, NftOp, NftTarget, NftVm};
use crate::extractor::{BlockEvents, EventMatcher};
use crate::node::{NodeQuerier, QueryError};

const ATTR_CONTRACT: &str = "_contract_address";

#[derive(Debug, Deserialize)]
struct ContractInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Minter {
    #[serde(default)]
    minter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NftInfo {
    #[serde(default)]
    token_uri: Option<String>,
}

/// CW721 contracts driven by `wasm` event attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmNft;

#[async_trait]
impl NftVm for WasmNft {
    fn name(&self) -> &'static str {
        "wasm_nft"
    }

    fn scan(&self, events: &BlockEvents<'_>) -> Result<Vec<NftOp>> {
        let mut ops = Vec::new();
        for event in events.iter(&EventMatcher::exact(EVENT_TYPE_WASM)) {
            let (Some(contract), Some(action)) = (event.get(ATTR_CONTRACT), event.get("action"))
            else {
                continue;
            };
            if !matches!(action, "mint" | "transfer_nft" | "send_nft" | "burn") {
                continue;
            }
            let Some(token_id) = event.get("token_id") else {
                warn!("{} by {} without token_id", action, contract);
                continue;
            };
            let target = NftTarget::key(NftKey::new(contract, token_id));

            let op = match action {
                "mint" => event.get("owner").map(|owner| NftOp::Mint {
                    target,
                    owner: owner.to_string(),
                }),
                "burn" => Some(NftOp::Burn { target }),
                _ => event.get("recipient").map(|to| NftOp::Transfer {
                    target,
                    to: to.to_string(),
                }),
            };
            match op {
                Some(op) => ops.push(op),
                None => warn!("{} by {} is missing its account attribute", action, contract),
            }
        }
        Ok(ops)
    }

    async fn collection_metadata(
        &self,
        querier: &dyn NodeQuerier,
        collection: &str,
        height: i64,
    ) -> Result<CollectionMeta, QueryError> {
        let info = querier
            .wasm_smart_query(collection, &json!({ "contract_info": {} }), height)
            .await?;
        let info: ContractInfo = serde_json::from_value(info)
            .map_err(|e| QueryError::Decode(format!("contract_info of {}: {}", collection, e)))?;

        let creator = match querier
            .wasm_smart_query(collection, &json!({ "minter": {} }), height)
            .await
        {
            Ok(value) => serde_json::from_value::<Minter>(value)
                .ok()
                .and_then(|m| m.minter),
            Err(e) if e.is_invalid_nft() => None,
            Err(e) => return Err(e),
        };

        Ok(CollectionMeta {
            name: info.name,
            creator,
        })
    }

    async fn token_uri(
        &self,
        querier: &dyn NodeQuerier,
        key: &NftKey,
        _object: Option<&str>,
        height: i64,
    ) -> Result<Option<String>, QueryError> {
        let query = json!({ "nft_info": { "token_id": key.token_id } });
        let info = querier
            .wasm_smart_query(&key.collection, &query, height)
            .await?;
        let info: NftInfo = serde_json::from_value(info)
            .map_err(|e| QueryError::Decode(format!("nft_info of {}: {}", key.collection, e)))?;
        Ok(info.token_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{BlockBuilder, MockQuerier};
    use rollscan_core::Event;

    const CONTRACT: &str = "init14hj2tavq8fpesdwxxcu44rty3hh90vhujrvcmstl4zr3txmfvw9s9zw8l5";

    fn wasm_event(pairs: &[(&str, &str)]) -> Event {
        let mut attrs = vec![(ATTR_CONTRACT, CONTRACT)];
        attrs.extend_from_slice(pairs);
        Event::new("wasm", attrs)
    }

    #[test]
    fn test_scan_actions() {
        let block = BlockBuilder::new(30)
            .tx("AQ==", vec![
                wasm_event(&[("action", "mint"), ("token_id", "1"), ("owner", "init1a"), ("minter", "init1m")]),
                wasm_event(&[("action", "transfer_nft"), ("token_id", "1"), ("recipient", "init1b"), ("sender", "init1a")]),
                wasm_event(&[("action", "send_nft"), ("token_id", "1"), ("recipient", "init1c"), ("sender", "init1b")]),
                wasm_event(&[("action", "burn"), ("token_id", "2"), ("sender", "init1a")]),
                wasm_event(&[("action", "approve"), ("token_id", "1"), ("spender", "init1x")]),
            ])
            .build();
        let events = BlockEvents::new(&block).unwrap();
        let ops = WasmNft.scan(&events).unwrap();

        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], NftOp::Mint { owner, .. } if owner == "init1a"));
        assert!(matches!(&ops[1], NftOp::Transfer { to, .. } if to == "init1b"));
        assert!(matches!(&ops[2], NftOp::Transfer { to, .. } if to == "init1c"));
        assert_eq!(
            ops[3],
            NftOp::Burn {
                target: NftTarget::key(NftKey::new(CONTRACT, "2"))
            }
        );
    }

    #[tokio::test]
    async fn test_metadata_queries() {
        let querier = MockQuerier::default();
        querier.set_wasm_query(
            CONTRACT,
            json!({"contract_info": {}}),
            json!({"name": "Punks", "symbol": "PNK"}),
        );
        querier.set_wasm_query(CONTRACT, json!({"minter": {}}), json!({"minter": "init1m"}));
        querier.set_wasm_query(
            CONTRACT,
            json!({"nft_info": {"token_id": "1"}}),
            json!({"token_uri": null, "extension": {}}),
        );

        let meta = WasmNft.collection_metadata(&querier, CONTRACT, 30).await.unwrap();
        assert_eq!(meta.name, "Punks");
        assert_eq!(meta.creator.as_deref(), Some("init1m"));

        let uri = WasmNft
            .token_uri(&querier, &NftKey::new(CONTRACT, "1"), None, 30)
            .await
            .unwrap();
        assert_eq!(uri, None);
    }

    #[tokio::test]
    async fn test_unknown_contract_is_invalid() {
        let querier = MockQuerier::default();
        let err = WasmNft
            .collection_metadata(&querier, CONTRACT, 30)
            .await
            .unwrap_err();
        assert!(err.is_invalid_nft());
    }
}
