//! CometBFT RPC block source.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollscan_core::{
    Event, ScrapedBlock, TxResult, ATTR_MODE, MODE_BEGIN_BLOCK, MODE_PRE_BLOCK,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

use super::{BlockSource, ScrapeError};

/// Fetches blocks over the CometBFT JSON-RPC HTTP interface.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http_client: reqwest::Client,
    rpc_url: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<String>,
}

impl RpcErrorBody {
    fn describe(&self) -> String {
        match &self.data {
            Some(data) if !data.is_empty() => format!("{}: {}", self.message, data),
            _ => self.message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block_id: BlockId,
    block: RawBlock,
}

#[derive(Debug, Deserialize)]
struct BlockId {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: RawHeader,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    chain_id: String,
    #[serde(deserialize_with = "de_i64")]
    height: i64,
    time: DateTime<Utc>,
    proposer_address: String,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    txs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BlockResultsResponse {
    #[serde(default)]
    txs_results: Option<Vec<RawTxResult>>,
    #[serde(default)]
    begin_block_events: Option<Vec<Event>>,
    #[serde(default)]
    end_block_events: Option<Vec<Event>>,
    #[serde(default)]
    finalize_block_events: Option<Vec<Event>>,
}

#[derive(Debug, Deserialize)]
struct RawTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    log: String,
    #[serde(default, deserialize_with = "de_i64")]
    gas_wanted: i64,
    #[serde(default, deserialize_with = "de_i64")]
    gas_used: i64,
    #[serde(default)]
    events: Option<Vec<Event>>,
}

impl From<RawTxResult> for TxResult {
    fn from(raw: RawTxResult) -> Self {
        TxResult {
            code: raw.code,
            codespace: raw.codespace,
            log: raw.log,
            gas_wanted: raw.gas_wanted,
            gas_used: raw.gas_used,
            events: raw.events.unwrap_or_default(),
        }
    }
}

/// CometBFT renders 64-bit integers as strings.
fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        Str(String),
        Int(i64),
    }

    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrInt::Int(n) => Ok(n),
    }
}

impl RpcClient {
    /// Create a client for `rpc_url` (e.g. `http://localhost:26657`).
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(64)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(timeout)
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, height: i64) -> Result<T, ScrapeError> {
        let url = format!("{}/{}?height={}", self.rpc_url, endpoint, height);
        let transport = |e: reqwest::Error| ScrapeError::Transport {
            height,
            message: e.to_string(),
        };

        let response = self.http_client.get(&url).send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ScrapeError::from_node_message(
                height,
                format!("{} returned {}: {}", endpoint, status, body),
            ));
        }

        let envelope: RpcEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| ScrapeError::Decode {
                height,
                message: format!("{}: {}", endpoint, e),
            })?;

        if let Some(error) = envelope.error {
            return Err(ScrapeError::from_node_message(height, error.describe()));
        }

        envelope.result.ok_or_else(|| ScrapeError::Decode {
            height,
            message: format!("{}: response has neither result nor error", endpoint),
        })
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn fetch_block(&self, height: i64) -> Result<ScrapedBlock, ScrapeError> {
        let (block, results) = tokio::try_join!(
            self.get::<BlockResponse>("block", height),
            self.get::<BlockResultsResponse>("block_results", height),
        )?;

        debug!(height, "Fetched block and results");
        assemble_block(height, block, results)
    }
}

fn assemble_block(
    height: i64,
    block: BlockResponse,
    results: BlockResultsResponse,
) -> Result<ScrapedBlock, ScrapeError> {
    if block.block.header.height != height {
        return Err(ScrapeError::Decode {
            height,
            message: format!("node returned block {}", block.block.header.height),
        });
    }

    let mut pre_block_events = Vec::new();
    let mut begin_block_events = results.begin_block_events.unwrap_or_default();
    let mut end_block_events = results.end_block_events.unwrap_or_default();

    for event in results.finalize_block_events.unwrap_or_default() {
        match event.attribute(ATTR_MODE) {
            Some(MODE_PRE_BLOCK) => pre_block_events.push(event),
            Some(MODE_BEGIN_BLOCK) => begin_block_events.push(event),
            _ => end_block_events.push(event),
        }
    }

    Ok(ScrapedBlock {
        chain_id: block.block.header.chain_id,
        height,
        timestamp: block.block.header.time,
        hash: block.block_id.hash,
        proposer: block.block.header.proposer_address,
        txs: block.block.data.txs.unwrap_or_default(),
        tx_results: results
            .txs_results
            .unwrap_or_default()
            .into_iter()
            .map(TxResult::from)
            .collect(),
        pre_block_events,
        begin_block_events,
        end_block_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_JSON: &str = r#"{
        "jsonrpc": "2.0", "id": -1,
        "result": {
            "block_id": {"hash": "ABCD"},
            "block": {
                "header": {
                    "chain_id": "minimove-1",
                    "height": "42",
                    "time": "2024-05-01T12:00:00.123456789Z",
                    "proposer_address": "F00D"
                },
                "data": {"txs": ["aGVsbG8="]}
            }
        }
    }"#;

    const RESULTS_JSON: &str = r#"{
        "jsonrpc": "2.0", "id": -1,
        "result": {
            "height": "42",
            "txs_results": [{
                "code": 0, "codespace": "", "log": "",
                "gas_wanted": "200000", "gas_used": "81234",
                "events": [{"type": "tx", "attributes": [{"key": "fee", "value": "10uinit", "index": true}]}]
            }],
            "finalize_block_events": [
                {"type": "upgrade", "attributes": [{"key": "mode", "value": "PreBlock"}]},
                {"type": "mint", "attributes": [{"key": "mode", "value": "BeginBlock"}]},
                {"type": "commission", "attributes": [{"key": "mode", "value": "EndBlock"}]}
            ]
        }
    }"#;

    fn parse<T: DeserializeOwned>(json: &str) -> T {
        let envelope: RpcEnvelope<T> = serde_json::from_str(json).unwrap();
        envelope.result.unwrap()
    }

    #[test]
    fn test_assemble_block_splits_finalize_events() {
        let block = assemble_block(42, parse(BLOCK_JSON), parse(RESULTS_JSON)).unwrap();

        assert_eq!(block.chain_id, "minimove-1");
        assert_eq!(block.hash, "ABCD");
        assert_eq!(block.proposer, "F00D");
        assert_eq!(block.txs, vec!["aGVsbG8=".to_string()]);
        assert_eq!(block.tx_results[0].gas_used, 81234);
        assert_eq!(block.tx_results[0].gas_wanted, 200000);
        assert_eq!(block.pre_block_events[0].ty, "upgrade");
        assert_eq!(block.begin_block_events[0].ty, "mint");
        assert_eq!(block.end_block_events[0].ty, "commission");
        assert_eq!(block.timestamp_millis() % 1000, 123);
    }

    #[test]
    fn test_assemble_block_rejects_wrong_height() {
        let err = assemble_block(43, parse(BLOCK_JSON), parse(RESULTS_JSON)).unwrap_err();
        assert!(matches!(err, ScrapeError::Decode { height: 43, .. }));
    }

    #[test]
    fn test_legacy_and_empty_results() {
        let results: BlockResultsResponse = parse(
            r#"{"result": {"txs_results": null, "begin_block_events": [{"type": "a"}], "end_block_events": null}}"#,
        );
        let mut block: BlockResponse = parse(BLOCK_JSON);
        block.block.data.txs = None;

        let block = assemble_block(42, block, results).unwrap();
        assert!(block.txs.is_empty());
        assert!(block.tx_results.is_empty());
        assert_eq!(block.begin_block_events.len(), 1);
    }

    #[test]
    fn test_error_body_classification() {
        let envelope: RpcEnvelope<BlockResponse> = serde_json::from_str(
            r#"{"error": {"code": -32603, "message": "Internal error", "data": "height 60 must be less than or equal to the current blockchain height 53"}}"#,
        )
        .unwrap();
        let err = ScrapeError::from_node_message(60, envelope.error.unwrap().describe());
        assert!(err.is_boundary());
    }
}
