//! Payout Provider Client
//!
//! Submits crypto payouts to NOWPayments. Amounts are always sent with
//! 8 decimal places regardless of the currency's native precision.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::common::http::{client_with_timeout, DEFAULT_PAYOUT_TIMEOUT};
use crate::types::Currency;
use crate::units;

/// NOWPayments API
pub const NOWPAYMENTS_URL: &str = "https://api.nowpayments.io/v1";

/// Moves funds to a user's address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    /// Submit a payout and return the provider-assigned transaction id
    async fn submit_payout(
        &self,
        address: &str,
        amount: f64,
        currency: Currency,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct PayoutBody<'a> {
    address: &'a str,
    amount: String,
    currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipn_callback_url: Option<&'a str>,
}

/// NOWPayments HTTP client
#[derive(Debug, Clone)]
pub struct NowPaymentsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    callback_url: Option<String>,
}

impl NowPaymentsClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: client_with_timeout(DEFAULT_PAYOUT_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            callback_url: None,
        }
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }

    /// Set the IPN callback the provider notifies on status changes
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl PayoutProvider for NowPaymentsClient {
    async fn submit_payout(
        &self,
        address: &str,
        amount: f64,
        currency: Currency,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;

        let body = PayoutBody {
            address,
            amount: units::format_amount(amount),
            currency: currency.symbol().to_lowercase(),
            ipn_callback_url: self.callback_url.as_deref(),
        };

        let url = format!("{}/payout", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let status = resp.status();
        let data: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            let message = data
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("NOWPayments API error");
            return Err(ProviderError::Rejected(message.to_string()));
        }

        // Accepted but unidentified: the payout may still go out
        payout_id(&data).ok_or_else(|| {
            ProviderError::Ambiguous("NOWPayments response missing payout_id".to_string())
        })
    }
}

/// Only a request that never reached the provider is a definite rejection
fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_builder() {
        ProviderError::Rejected(e.to_string())
    } else {
        ProviderError::Ambiguous(e.to_string())
    }
}

/// Provider ids come back as either strings or numbers
fn payout_id(data: &serde_json::Value) -> Option<String> {
    let id = data.get("payout_id").or_else(|| data.get("id"))?;
    match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Payout submission errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("NOWPAYMENTS_API_KEY is not set.")]
    MissingApiKey,

    #[error("{0}")]
    Rejected(String),

    /// The provider may have accepted the payout
    #[error("payout outcome unknown: {0}")]
    Ambiguous(String),
}

impl ProviderError {
    /// True when no funds can have moved, so the points may be refunded
    pub fn is_definite_rejection(&self) -> bool {
        !matches!(self, ProviderError::Ambiguous(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};

    const ADDRESS: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

    fn client(path: &str) -> NowPaymentsClient {
        NowPaymentsClient::new(
            &format!("{}/{}", mockito::server_url(), path),
            Some("test_key".to_string()),
        )
    }

    #[tokio::test]
    async fn test_submit_payout_formats_request() {
        let m = mock("POST", "/payout-ok/payout")
            .match_header("x-api-key", "test_key")
            .match_body(Matcher::Json(serde_json::json!({
                "address": ADDRESS,
                "amount": "0.01000000",
                "currency": "btc"
            })))
            .with_status(200)
            .with_body(r#"{"payout_id":"5000000713"}"#)
            .create();

        let tx = client("payout-ok")
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap();

        assert_eq!(tx, "5000000713");
        m.assert();
    }

    #[tokio::test]
    async fn test_numeric_payout_id() {
        let _m = mock("POST", "/payout-num/payout")
            .with_status(201)
            .with_body(r#"{"id":42}"#)
            .create();

        let tx = client("payout-num")
            .submit_payout(ADDRESS, 0.5, Currency::Btc)
            .await
            .unwrap();
        assert_eq!(tx, "42");
    }

    #[tokio::test]
    async fn test_rejection_carries_upstream_message() {
        let _m = mock("POST", "/payout-rejected/payout")
            .with_status(400)
            .with_body(r#"{"message":"Insufficient balance"}"#)
            .create();

        let err = client("payout-rejected")
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Rejected("Insufficient balance".to_string()));
    }

    #[tokio::test]
    async fn test_rejection_without_message() {
        let _m = mock("POST", "/payout-opaque/payout")
            .with_status(500)
            .with_body("oops")
            .create();

        let err = client("payout-opaque")
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "NOWPayments API error");
    }

    #[tokio::test]
    async fn test_accepted_without_id_is_ambiguous() {
        let _m = mock("POST", "/payout-waiting/payout")
            .with_status(200)
            .with_body(r#"{"status":"WAITING"}"#)
            .create();

        let err = client("payout-waiting")
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Ambiguous(_)));
        assert!(!err.is_definite_rejection());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_rejection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = NowPaymentsClient::new(&format!("http://{}", addr), Some("k".to_string()))
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
        assert!(err.is_definite_rejection());
    }

    #[tokio::test]
    async fn test_timeout_is_ambiguous() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });

        let err = NowPaymentsClient::new(&format!("http://{}", addr), Some("k".to_string()))
            .with_timeout(std::time::Duration::from_millis(200))
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Ambiguous(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = NowPaymentsClient::new(NOWPAYMENTS_URL, None);
        assert!(!client.has_api_key());

        let err = client
            .submit_payout(ADDRESS, 0.01, Currency::Btc)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingApiKey);
        assert_eq!(err.to_string(), "NOWPAYMENTS_API_KEY is not set.");
    }
}
