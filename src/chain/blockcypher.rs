//! BlockCypher client for Litecoin and Dogecoin confirmations

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::common::http::{client_with_timeout, DEFAULT_HTTP_TIMEOUT};
use super::{ChainError, ConfirmationSource};

pub const BLOCKCYPHER_URL: &str = "https://api.blockcypher.com";

#[derive(Debug, Clone)]
pub struct BlockCypherClient {
    client: Client,
    base_url: String,
    /// Chain slug: "ltc", "doge", "btc"
    coin: String,
}

#[derive(Debug, Deserialize)]
struct TxSummary {
    #[serde(default)]
    confirmations: u32,
}

impl BlockCypherClient {
    pub fn new(base_url: &str, coin: &str) -> Self {
        Self {
            client: client_with_timeout(DEFAULT_HTTP_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
            coin: coin.to_string(),
        }
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }
}

#[async_trait]
impl ConfirmationSource for BlockCypherClient {
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, ChainError> {
        let url = format!("{}/v1/{}/main/txs/{}", self.base_url, self.coin, tx_hash);
        let resp = self.client.get(&url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(ChainError::TxNotFound(tx_hash.to_string())),
            s if !s.is_success() => Err(ChainError::Node(format!("blockcypher status {}", s))),
            _ => {
                let tx: TxSummary = resp.json().await?;
                Ok(tx.confirmations)
            }
        }
    }

    fn name(&self) -> &'static str {
        "blockcypher"
    }
}
