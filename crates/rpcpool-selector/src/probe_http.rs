//! HTTP JSON-RPC block-number prober.
//!
//! Speaks the JSON-RPC 2.0 `eth_blockNumber` call that EVM-family endpoints
//! answer with a hex quantity (`"0x12d4f1c"`). Some providers return a bare
//! JSON number instead; both encodings are accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rpcpool_common::error::ProbeError;
use rpcpool_common::prober::BlockNumberProber;

/// JSON-RPC 2.0 response envelope, reduced to the fields the probe reads.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Probes endpoints with an `eth_blockNumber` request over HTTP.
pub struct HttpBlockNumberProber {
    client: Client,
}

impl HttpBlockNumberProber {
    /// Builds the prober with a shared connection-pooling HTTP client.
    pub fn new() -> std::result::Result<Self, ProbeError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Builds the prober around an existing client, so callers can share
    /// their proxy/TLS configuration.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlockNumberProber for HttpBlockNumberProber {
    async fn probe(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<u64, ProbeError> {
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1,
        });

        let request = self.client.post(url).json(&body).timeout(timeout).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout.as_millis() as u64)
                } else {
                    ProbeError::Transport(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Transport(format!("HTTP status {status}")));
        }

        let envelope: JsonRpcResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            body = response.json() => body.map_err(|e| ProbeError::Protocol(e.to_string()))?,
        };

        if let Some(error) = envelope.error {
            return Err(ProbeError::Protocol(format!(
                "JSON-RPC error {}: {}",
                error.code, error.message
            )));
        }
        let result = envelope
            .result
            .ok_or_else(|| ProbeError::Protocol("response carries no result".to_string()))?;

        let block = parse_block_number(&result)?;
        debug!(%url, block, "Block number probe succeeded");
        Ok(block)
    }
}

/// Parses a block number from a JSON-RPC result value.
fn parse_block_number(value: &Value) -> std::result::Result<u64, ProbeError> {
    match value {
        Value::String(s) => {
            let hex = s
                .strip_prefix("0x")
                .ok_or_else(|| ProbeError::Protocol(format!("not a hex quantity: {s:?}")))?;
            u64::from_str_radix(hex, 16)
                .map_err(|e| ProbeError::Protocol(format!("bad hex quantity {s:?}: {e}")))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ProbeError::Protocol(format!("negative or fractional block number: {n}"))),
        other => Err(ProbeError::Protocol(format!(
            "unexpected result type: {other}"
        ))),
    }
}
