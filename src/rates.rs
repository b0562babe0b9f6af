//! USD Exchange Rate Client
//!
//! Fetches spot prices from the CoinGecko simple price API. Failures are
//! soft: the rate degrades to 0 and the caller decides whether to continue.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use crate::common::http::{client_with_timeout, DEFAULT_HTTP_TIMEOUT};
use crate::types::Currency;

/// CoinGecko public API
pub const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

/// Source of USD quotes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    /// USD price of one unit of `currency`, or 0.0 when unavailable
    async fn fetch_usd_rate(&self, currency: Currency) -> f64;
}

/// CoinGecko HTTP client
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
}

impl CoinGeckoClient {
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

    /// Fetch a quote, surfacing the failure reason
    pub async fn quote(&self, currency: Currency) -> Result<f64, RateError> {
        let id = currency.coingecko_id();
        let url = format!("{}/simple/price", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RateError::Status(resp.status().as_u16()));
        }

        let body: HashMap<String, HashMap<String, f64>> = resp.json().await?;
        body.get(id)
            .and_then(|prices| prices.get("usd"))
            .copied()
            .ok_or_else(|| RateError::MissingQuote(id.to_string()))
    }
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new(COINGECKO_URL)
    }
}

#[async_trait]
impl RateSource for CoinGeckoClient {
    async fn fetch_usd_rate(&self, currency: Currency) -> f64 {
        match self.quote(currency).await {
            Ok(rate) => rate,
            Err(e) => {
                tracing::warn!(
                    target: "ptc::rates",
                    currency = %currency,
                    error = %e,
                    "exchange rate unavailable, using 0"
                );
                0.0
            }
        }
    }
}

/// Rate lookup errors (never surfaced past `RateSource`)
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote service returned status {0}")]
    Status(u16),

    #[error("no USD quote for {0}")]
    MissingQuote(String),
}
