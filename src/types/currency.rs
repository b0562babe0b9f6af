//! Currency Types
//!
//! Supported payout currencies and their registry rows.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Payout currency known to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Btc,
    Eth,
    /// Tether on Tron (TRC-20)
    Usdt,
    Trx,
    Ltc,
    Doge,
}

impl Currency {
    pub const ALL: [Currency; 6] = [
        Currency::Btc,
        Currency::Eth,
        Currency::Usdt,
        Currency::Trx,
        Currency::Ltc,
        Currency::Doge,
    ];

    /// Ticker symbol as stored in the registry
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
            Currency::Usdt => "USDT",
            Currency::Trx => "TRX",
            Currency::Ltc => "LTC",
            Currency::Doge => "DOGE",
        }
    }

    /// CoinGecko asset id used for USD quotes
    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Currency::Btc => "bitcoin",
            Currency::Eth => "ethereum",
            Currency::Usdt => "tether",
            Currency::Trx => "tron",
            Currency::Ltc => "litecoin",
            Currency::Doge => "dogecoin",
        }
    }

    /// Block explorer link for a transaction
    pub fn explorer_url(&self, tx_hash: &str) -> String {
        match self {
            Currency::Btc => format!("https://www.blockchain.com/btc/tx/{}", tx_hash),
            Currency::Eth => format!("https://etherscan.io/tx/{}", tx_hash),
            Currency::Usdt | Currency::Trx => {
                format!("https://tronscan.org/#/transaction/{}", tx_hash)
            }
            Currency::Ltc => format!("https://blockchair.com/litecoin/transaction/{}", tx_hash),
            Currency::Doge => format!("https://blockchair.com/dogecoin/transaction/{}", tx_hash),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unknown currency symbol
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BTC" => Ok(Currency::Btc),
            "ETH" => Ok(Currency::Eth),
            "USDT" => Ok(Currency::Usdt),
            "TRX" => Ok(Currency::Trx),
            "LTC" => Ok(Currency::Ltc),
            "DOGE" => Ok(Currency::Doge),
            _ => Err(UnknownCurrency(s.to_string())),
        }
    }
}

/// Explorer URL for a raw symbol. Unknown symbols yield an empty string.
pub fn explorer_url(symbol: &str, tx_hash: &str) -> String {
    symbol
        .parse::<Currency>()
        .map(|c| c.explorer_url(tx_hash))
        .unwrap_or_default()
}

/// Row of the `supported_cryptos` registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedCurrency {
    pub symbol: String,
    pub name: String,
    pub is_active: bool,
    /// Network fee in units of the currency
    pub network_fee: f64,
    /// Confirmations needed before a payout counts as final
    pub confirmations_required: u32,
    /// Points charged per whole unit of the currency
    pub conversion_rate: f64,
    /// Smallest amount a user may withdraw
    pub min_withdrawal: f64,
}

impl SupportedCurrency {
    /// Confirmation threshold, falling back to 1 when unset
    pub fn required_confirmations(&self) -> u32 {
        if self.confirmations_required == 0 {
            1
        } else {
            self.confirmations_required
        }
    }

    /// Point cost of withdrawing `amount` units, rounded to whole points.
    /// `None` when the cost is not finite or exceeds what the ledger can hold.
    pub fn points_for(&self, amount: f64) -> Option<u64> {
        let cost = (amount * self.conversion_rate).round();
        if !cost.is_finite() || cost < 0.0 || cost >= i64::MAX as f64 {
            return None;
        }
        Some(cost as u64)
    }

    /// Registry seeded into an empty store
    pub fn defaults() -> Vec<SupportedCurrency> {
        let row = |symbol: &str, name: &str, rate: f64, min: f64, fee: f64, confs: u32| {
            SupportedCurrency {
                symbol: symbol.to_string(),
                name: name.to_string(),
                is_active: true,
                network_fee: fee,
                confirmations_required: confs,
                conversion_rate: rate,
                min_withdrawal: min,
            }
        };

        vec![
            row("BTC", "Bitcoin", 1_000_000.0, 0.005, 0.0001, 2),
            row("ETH", "Ethereum", 30_000.0, 0.005, 0.002, 12),
            row("USDT", "Tether", 1_000.0, 5.0, 1.0, 19),
            row("TRX", "Tron", 100.0, 10.0, 1.0, 19),
            row("LTC", "Litecoin", 120_000.0, 0.005, 0.001, 6),
            row("DOGE", "Dogecoin", 25_000.0, 0.005, 1.0, 6),
        ]
    }
}
