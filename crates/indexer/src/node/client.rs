//! HTTP implementation of [`NodeQuerier`].

use alloy::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{EvmReceipt, NodeQuerier, QueryError, ValidatorInfo};
use crate::config::NodeConfig;

/// Header pinning a Cosmos REST query to a height.
const BLOCK_HEIGHT_HEADER: &str = "x-cosmos-block-height";

/// REST and EVM JSON-RPC client for node state queries.
#[derive(Clone, Debug)]
pub struct NodeClient {
    http_client: reqwest::Client,
    rest_url: String,
    json_rpc_url: Option<String>,
    request_id: Arc<AtomicU64>,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    resource: MoveResource,
}

#[derive(Debug, Deserialize)]
struct MoveResource {
    /// JSON document `{"type": ..., "data": ...}` encoded as a string.
    move_resource: String,
}

#[derive(Debug, Deserialize)]
struct SmartQueryResponse {
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResponse {
    validators: Vec<RawValidator>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct RawValidator {
    #[serde(default)]
    moniker: String,
    operator_address: String,
    consensus_pubkey: PubKey,
}

#[derive(Debug, Deserialize)]
struct PubKey {
    key: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next_key: Option<String>,
}

fn format_height(height: i64) -> String {
    format!("{:#x}", height)
}

impl NodeClient {
    /// Create a client from the node configuration.
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(64)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build node HTTP client")?;

        Ok(Self {
            http_client,
            rest_url: config.rest_url.trim_end_matches('/').to_string(),
            json_rpc_url: config.json_rpc_url.clone(),
            request_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn rest_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        height: Option<i64>,
    ) -> Result<T, QueryError> {
        let url = format!("{}{}", self.rest_url, path);
        let mut request = self.http_client.get(&url).query(query);
        if let Some(height) = height {
            request = request.header(BLOCK_HEIGHT_HEADER, height.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| QueryError::Decode(format!("{}: {}", path, e)))
    }

    async fn json_rpc(&self, method: &str, params: Vec<Value>) -> Result<Value, QueryError> {
        let url = self
            .json_rpc_url
            .as_deref()
            .ok_or(QueryError::NotConfigured("json_rpc_url"))?;

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::SeqCst),
        };

        let response = self
            .http_client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| QueryError::Decode(format!("{}: {}", method, e)))?;

        if let Some(error) = response.error {
            return Err(QueryError::Node(format!("{} ({})", error.message, error.code)));
        }

        response
            .result
            .ok_or_else(|| QueryError::Decode(format!("{}: missing result", method)))
    }
}

#[async_trait]
impl NodeQuerier for NodeClient {
    async fn move_resource(
        &self,
        address: &str,
        struct_tag: &str,
        height: i64,
    ) -> Result<Value, QueryError> {
        let path = format!(
            "/initia/move/v1/accounts/{}/resources/by_struct_tag",
            address
        );
        let response: ResourceResponse = self
            .rest_get(&path, &[("struct_tag", struct_tag)], Some(height))
            .await?;

        let mut document: Value = serde_json::from_str(&response.resource.move_resource)
            .map_err(|e| QueryError::Decode(format!("move_resource of {}: {}", address, e)))?;

        Ok(document
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn wasm_smart_query(
        &self,
        contract: &str,
        query: &Value,
        height: i64,
    ) -> Result<Value, QueryError> {
        let encoded = URL_SAFE.encode(query.to_string());
        let path = format!("/cosmwasm/wasm/v1/contract/{}/smart/{}", contract, encoded);
        let response: SmartQueryResponse = self.rest_get(&path, &[], Some(height)).await?;
        Ok(response.data)
    }

    async fn eth_call(&self, to: Address, data: Bytes, height: i64) -> Result<Bytes, QueryError> {
        let result = self
            .json_rpc(
                "eth_call",
                vec![json!({ "to": to, "data": data }), json!(format_height(height))],
            )
            .await?;

        serde_json::from_value(result).map_err(|e| QueryError::Decode(format!("eth_call: {}", e)))
    }

    async fn validators(&self) -> Result<Vec<ValidatorInfo>, QueryError> {
        let mut validators = Vec::new();
        let mut next_key: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = match next_key.as_deref() {
                Some(key) => vec![("pagination.key", key)],
                None => Vec::new(),
            };
            let page: ValidatorsResponse = self
                .rest_get("/opinit/opchild/v1/validators", &query, None)
                .await?;

            for raw in page.validators {
                let pubkey = STANDARD.decode(&raw.consensus_pubkey.key).map_err(|e| {
                    QueryError::Decode(format!(
                        "consensus pubkey of {}: {}",
                        raw.operator_address, e
                    ))
                })?;
                validators.push(ValidatorInfo {
                    consensus_address: rollscan_core::consensus_address(&pubkey),
                    operator_address: raw.operator_address,
                    moniker: raw.moniker,
                });
            }

            next_key = page
                .pagination
                .and_then(|p| p.next_key)
                .filter(|key| !key.is_empty());
            if next_key.is_none() {
                break;
            }
        }

        debug!("Loaded {} validators", validators.len());
        Ok(validators)
    }

    async fn evm_block_receipts(&self, height: i64) -> Result<Vec<EvmReceipt>, QueryError> {
        let result = self
            .json_rpc("eth_getBlockReceipts", vec![json!(format_height(height))])
            .await?;

        if result.is_null() {
            return Ok(Vec::new());
        }

        serde_json::from_value(result)
            .map_err(|e| QueryError::Decode(format!("eth_getBlockReceipts: {}", e)))
    }
}
