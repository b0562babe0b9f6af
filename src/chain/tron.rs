//! TronGrid client for TRX and TRC-20 (USDT) confirmations

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::common::http::{client_with_timeout, DEFAULT_HTTP_TIMEOUT};
use super::{ChainError, ConfirmationSource};

pub const TRONGRID_URL: &str = "https://api.trongrid.io";

#[derive(Debug, Clone)]
pub struct TronGridClient {
    client: Client,
    base_url: String,
}

/// `gettransactioninfobyid` returns `{}` until the transaction is in a block
#[derive(Debug, Deserialize)]
struct TxInfo {
    #[serde(rename = "blockNumber")]
    block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NowBlock {
    block_header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    raw_data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    number: u64,
}

impl TronGridClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: client_with_timeout(DEFAULT_HTTP_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }

    pub async fn head_block(&self) -> Result<u64, ChainError> {
        let url = format!("{}/wallet/getnowblock", self.base_url);
        let block: NowBlock = self.client.post(&url).send().await?.json().await?;
        Ok(block.block_header.raw_data.number)
    }
}

#[async_trait]
impl ConfirmationSource for TronGridClient {
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, ChainError> {
        let url = format!("{}/wallet/gettransactioninfobyid", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "value": tx_hash }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ChainError::Node(format!("trongrid status {}", resp.status())));
        }

        let info: TxInfo = resp.json().await?;
        let Some(tx_block) = info.block_number else {
            return Ok(0);
        };

        let head = self.head_block().await?;
        Ok((head.saturating_sub(tx_block) + 1) as u32)
    }

    fn name(&self) -> &'static str {
        "trongrid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;

    #[tokio::test]
    async fn test_depth_from_head() {
        let _info = mock("POST", "/tron-depth/wallet/gettransactioninfobyid")
            .with_status(200)
            .with_body(r#"{"id":"aa","blockNumber":1000,"fee":1}"#)
            .create();
        let _head = mock("POST", "/tron-depth/wallet/getnowblock")
            .with_status(200)
            .with_body(r#"{"blockID":"x","block_header":{"raw_data":{"number":1018}}}"#)
            .create();

        let client = TronGridClient::new(&format!("{}/tron-depth", mockito::server_url()));
        assert_eq!(client.confirmations("aa").await.unwrap(), 19);
    }

    #[tokio::test]
    async fn test_unknown_tx_is_pending() {
        let _info = mock("POST", "/tron-pending/wallet/gettransactioninfobyid")
            .with_status(200)
            .with_body("{}")
            .create();

        let client = TronGridClient::new(&format!("{}/tron-pending", mockito::server_url()));
        assert_eq!(client.confirmations("aa").await.unwrap(), 0);
    }
}
