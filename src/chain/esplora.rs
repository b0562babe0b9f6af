//! Esplora API Client
//!
//! Confirmation lookups for Bitcoin payouts.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::common::http::{client_with_timeout, DEFAULT_HTTP_TIMEOUT};
use super::{ChainError, ConfirmationSource};

/// Esplora API endpoints
pub const MAINNET_URL: &str = "https://blockstream.info/api";
pub const TESTNET_URL: &str = "https://blockstream.info/testnet/api";

/// Esplora HTTP client
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    /// Create a new client with custom URL
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get transaction status
    pub async fn get_tx_status(&self, txid: &str) -> Result<EsploraTxStatus, ChainError> {
        let url = format!("{}/tx/{}/status", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(ChainError::TxNotFound(txid.to_string()));
        }

        Ok(resp.json().await?)
    }

    /// Get current block height
    pub async fn get_block_height(&self) -> Result<u64, ChainError> {
        let url = format!("{}/blocks/tip/height", self.base_url);
        let resp = self.client.get(&url).send().await?;

        resp.text()
            .await?
            .trim()
            .parse()
            .map_err(|_| ChainError::Parse("failed to parse block height".to_string()))
    }
}

#[async_trait]
impl ConfirmationSource for EsploraClient {
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, ChainError> {
        let status = self.get_tx_status(tx_hash).await?;

        if !status.confirmed {
            return Ok(0);
        }

        let current_height = self.get_block_height().await?;
        let tx_height = status.block_height.unwrap_or(current_height);

        Ok((current_height.saturating_sub(tx_height) + 1) as u32)
    }

    fn name(&self) -> &'static str {
        "esplora"
    }
}

/// Transaction status
#[derive(Debug, Clone, Deserialize)]
pub struct EsploraTxStatus {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    pub block_time: Option<u64>,
}
