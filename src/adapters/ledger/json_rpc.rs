//! JSON-RPC Ledger Client - EVM Broadcast and Receipt Polling
//!
//! Implements the `LedgerClient` port over plain JSON-RPC with reqwest:
//! - `eth_sendRawTransaction` to broadcast signed bytes
//! - `eth_getTransactionReceipt` for inclusion (null = pending,
//!   status 0x1 = confirmed, 0x0 = reverted)
//! - `eth_getBlockByNumber("latest")` for the reference height and hash
//!
//! Hex quantities and hashes are decoded with alloy primitives. One
//! instance is shared read-only by every session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{hex, B256, U64};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::types::TxId;
use crate::ports::ledger::{BroadcastError, LedgerClient, LedgerStatus, ReferenceBlock};

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Subset of a transaction receipt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    status: Option<String>,
    block_number: Option<String>,
}

/// Subset of a block header.
#[derive(Debug, Deserialize)]
struct BlockDto {
    number: String,
    hash: Option<String>,
}

/// EVM JSON-RPC ledger client.
pub struct JsonRpcLedger {
    /// HTTP client.
    http: Client,
    /// RPC endpoint.
    url: String,
    /// Request id counter.
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    /// Connect to an RPC endpoint.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RPC client")?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC call and return its `result`.
    async fn call(&self, method: &'static str, params: Value) -> Result<Value, CallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let transport = |source| CallError::Transport { method, source };

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;

        if let Some(err) = response.error {
            return Err(CallError::Node {
                method,
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// Failure of one JSON-RPC call.
#[derive(Error, Debug)]
enum CallError {
    /// Send, HTTP status, or body decode failed; the node may still
    /// have processed the request.
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The node answered with a JSON-RPC error object.
    #[error("{method} error {code}: {message}")]
    Node {
        method: &'static str,
        code: i64,
        message: String,
    },
}

impl From<CallError> for BroadcastError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Node { .. } => Self::Refused(err.to_string()),
            CallError::Transport { .. } => Self::Ambiguous(err.to_string()),
        }
    }
}

/// Decode a hex quantity (`0x1b4`) into u64.
fn parse_quantity(value: &str) -> Result<u64> {
    let quantity: U64 = value
        .parse()
        .with_context(|| format!("invalid hex quantity {value:?}"))?;
    Ok(quantity.to::<u64>())
}

/// Classify a receipt (or its absence).
fn receipt_status(result: Value) -> Result<LedgerStatus> {
    if result.is_null() {
        return Ok(LedgerStatus::Pending);
    }
    let receipt: ReceiptDto = serde_json::from_value(result).context("malformed receipt")?;
    match receipt.status.as_deref() {
        Some(status) if parse_quantity(status)? == 1 => Ok(LedgerStatus::Confirmed),
        Some(_) => Ok(LedgerStatus::Rejected(format!(
            "reverted in block {}",
            receipt.block_number.as_deref().unwrap_or("?")
        ))),
        None => Ok(LedgerStatus::Pending),
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    #[instrument(skip(self, signed), fields(bytes = signed.len()))]
    async fn broadcast(&self, signed: &[u8]) -> Result<TxId, BroadcastError> {
        let raw = hex::encode_prefixed(signed);
        let result = self.call("eth_sendRawTransaction", json!([raw])).await?;
        // The node accepted the request, but without a hash there is
        // nothing to poll.
        let hash_str = result.as_str().ok_or_else(|| {
            BroadcastError::Ambiguous("eth_sendRawTransaction returned no hash".to_string())
        })?;
        let hash: B256 = hash_str.parse().map_err(|_| {
            BroadcastError::Ambiguous(format!("invalid transaction hash {hash_str:?}"))
        })?;
        debug!(%hash, "Broadcast accepted");
        Ok(hash.to_string())
    }

    async fn get_status(&self, id: &TxId) -> Result<LedgerStatus> {
        let result = self
            .call("eth_getTransactionReceipt", json!([id]))
            .await?;
        receipt_status(result)
    }

    async fn reference_block(&self) -> Result<ReferenceBlock> {
        let result = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let block: BlockDto = serde_json::from_value(result).context("malformed block")?;
        let hash = match block.hash {
            Some(h) => Some(
                h.parse::<B256>()
                    .with_context(|| format!("invalid block hash {h:?}"))?
                    .to_string(),
            ),
            None => None,
        };
        Ok(ReferenceBlock {
            height: parse_quantity(&block.number)?,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("zz").is_err());
    }

    #[test]
    fn test_receipt_status() {
        assert_eq!(receipt_status(Value::Null).unwrap(), LedgerStatus::Pending);
        assert_eq!(
            receipt_status(json!({"status": "0x1", "blockNumber": "0x10"})).unwrap(),
            LedgerStatus::Confirmed
        );
        match receipt_status(json!({"status": "0x0", "blockNumber": "0x10"})).unwrap() {
            LedgerStatus::Rejected(reason) => assert!(reason.contains("0x10")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_node_error_is_a_refusal() {
        let err = CallError::Node {
            method: "eth_sendRawTransaction",
            code: -32000,
            message: "nonce too low".to_string(),
        };
        match BroadcastError::from(err) {
            BroadcastError::Refused(reason) => assert!(reason.contains("nonce too low")),
            other => panic!("expected Refused, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_node_is_ambiguous() {
        let ledger = JsonRpcLedger::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let result = ledger.broadcast(&[0xde, 0xad]).await;
        assert!(
            matches!(result, Err(BroadcastError::Ambiguous(_))),
            "unexpected {result:?}"
        );
    }
}
