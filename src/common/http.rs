//! Shared HTTP client construction
//!
//! Every upstream call carries a timeout so a hung provider cannot park a
//! request (and a debited withdrawal) indefinitely.

use reqwest::Client;
use std::time::Duration;

/// Payout submissions: must stay below the stale-withdrawal window
pub const DEFAULT_PAYOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate lookups and chain queries
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a client whose requests give up after `timeout`
pub fn client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "ptc::http", error = %e, "falling back to default HTTP client");
            Client::new()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_timeout_longer_than_reads() {
        assert!(DEFAULT_PAYOUT_TIMEOUT > DEFAULT_HTTP_TIMEOUT);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = client_with_timeout(Duration::from_millis(200));
        let err = client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
