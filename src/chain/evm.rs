//! Ethereum JSON-RPC confirmation source
//!
//! Depth = `eth_blockNumber - receipt.blockNumber + 1`. A missing receipt
//! means the transaction is still pending.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::common::http::{client_with_timeout, DEFAULT_HTTP_TIMEOUT};
use super::{ChainError, ConfirmationSource};

#[derive(Debug, Clone)]
pub struct EvmRpcClient {
    client: Client,
    rpc_url: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

impl EvmRpcClient {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: client_with_timeout(DEFAULT_HTTP_TIMEOUT),
            rpc_url: rpc_url.to_string(),
        }
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match resp.error {
            Some(err) => Err(ChainError::Node(err.message)),
            None => Ok(resp.result),
        }
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }
}

/// Decode a `0x`-prefixed hex quantity
fn parse_quantity(value: &serde_json::Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Parse(format!("expected hex quantity, got {}", value)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Parse(e.to_string()))
}

#[async_trait]
impl ConfirmationSource for EvmRpcClient {
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, ChainError> {
        let receipt = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        let Some(block) = receipt.get("blockNumber").filter(|b| !b.is_null()) else {
            return Ok(0);
        };

        let tx_block = parse_quantity(block)?;
        let head = self.block_number().await?;

        Ok((head.saturating_sub(tx_block) + 1) as u32)
    }

    fn name(&self) -> &'static str {
        "evm-rpc"
    }
}
