//! Chain Confirmation Sources
//!
//! One capability, many chains: every supported currency is answered by a
//! [`ConfirmationSource`] that reports how many blocks have buried a
//! transaction.
//!
//! | Currency   | Source                   |
//! |------------|--------------------------|
//! | BTC        | Esplora REST             |
//! | LTC, DOGE  | BlockCypher REST         |
//! | ETH        | EVM JSON-RPC             |
//! | TRX, USDT  | TronGrid full-node HTTP  |
//!
//! The simulated source stands in for all of them in development.

pub mod blockcypher;
pub mod esplora;
pub mod evm;
pub mod simulated;
pub mod tron;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::common::config::{ConfirmationMode, PtcConfig};
use crate::types::Currency;

pub use blockcypher::BlockCypherClient;
pub use esplora::EsploraClient;
pub use evm::EvmRpcClient;
pub use simulated::SimulatedSource;
pub use tron::TronGridClient;

/// Reports the confirmation depth of a transaction on one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Number of confirmations, 0 while unconfirmed
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, ChainError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Confirmation source per currency
#[derive(Clone, Default)]
pub struct ConfirmationSources {
    sources: HashMap<Currency, Arc<dyn ConfirmationSource>>,
}

impl ConfirmationSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source for a currency, replacing any previous one
    pub fn with(mut self, currency: Currency, source: Arc<dyn ConfirmationSource>) -> Self {
        self.sources.insert(currency, source);
        self
    }

    /// Same source for every supported currency
    pub fn uniform(source: Arc<dyn ConfirmationSource>) -> Self {
        Currency::ALL
            .into_iter()
            .fold(Self::new(), |sources, c| sources.with(c, source.clone()))
    }

    /// Build the source table described by the configuration
    pub fn from_config(config: &PtcConfig) -> Self {
        match config.confirmation_mode {
            ConfirmationMode::Simulated => Self::uniform(Arc::new(SimulatedSource::default())),
            ConfirmationMode::Live => {
                let timeout = Duration::from_secs(config.http_timeout_secs);
                let tron: Arc<dyn ConfirmationSource> =
                    Arc::new(TronGridClient::new(&config.trongrid_url).with_timeout(timeout));
                let blockcypher = |coin: &str| -> Arc<dyn ConfirmationSource> {
                    Arc::new(
                        BlockCypherClient::new(&config.blockcypher_url, coin).with_timeout(timeout),
                    )
                };

                Self::new()
                    .with(
                        Currency::Btc,
                        Arc::new(EsploraClient::new(&config.esplora_url).with_timeout(timeout)),
                    )
                    .with(
                        Currency::Eth,
                        Arc::new(EvmRpcClient::new(&config.eth_rpc_url).with_timeout(timeout)),
                    )
                    .with(Currency::Ltc, blockcypher("ltc"))
                    .with(Currency::Doge, blockcypher("doge"))
                    .with(Currency::Trx, tron.clone())
                    .with(Currency::Usdt, tron)
            }
        }
    }

    pub fn get(&self, currency: Currency) -> Option<&Arc<dyn ConfirmationSource>> {
        self.sources.get(&currency)
    }
}

/// Chain query errors
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transaction not found on chain: {0}")]
    TxNotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("node error: {0}")]
    Node(String),

    #[error("no confirmation source for {0}")]
    NoSource(Currency),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_covers_all_currencies() {
        let sources = ConfirmationSources::uniform(Arc::new(SimulatedSource::default()));
        for currency in Currency::ALL {
            assert_eq!(sources.get(currency).unwrap().name(), "simulated");
        }
    }

    #[test]
    fn test_live_sources_per_chain() {
        let mut config = PtcConfig::development();
        config.confirmation_mode = ConfirmationMode::Live;

        let sources = ConfirmationSources::from_config(&config);
        assert_eq!(sources.get(Currency::Btc).unwrap().name(), "esplora");
        assert_eq!(sources.get(Currency::Eth).unwrap().name(), "evm-rpc");
        assert_eq!(sources.get(Currency::Ltc).unwrap().name(), "blockcypher");
        assert_eq!(sources.get(Currency::Doge).unwrap().name(), "blockcypher");
        assert_eq!(sources.get(Currency::Trx).unwrap().name(), "trongrid");
        assert_eq!(sources.get(Currency::Usdt).unwrap().name(), "trongrid");
    }
}
