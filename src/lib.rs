//! PTC Backend - Points-to-Crypto Withdrawals
//!
//! Server-side half of the rewards platform: users cash earned points out
//! as cryptocurrency and follow the payout until it is final on-chain.
//!
//! ## Services
//!
//! 1. **Withdrawal Service** - Validates, debits points, submits the payout
//! 2. **Confirmation Tracker** - Reports how many blocks have buried a payout
//! 3. **Reconciler** - Fails withdrawals stuck between debit and payout
//! 4. **Accounts & Referrals** - Server-owned balances and referral rewards
//!
//! ## Upstreams
//!
//! - NOWPayments (payouts)
//! - CoinGecko (USD rates)
//! - Esplora, BlockCypher, EVM JSON-RPC, TronGrid (confirmations)

pub mod accounts;
pub mod address;
pub mod api;
pub mod chain;
pub mod common;
pub mod payout;
pub mod rates;
pub mod referral;
pub mod storage;
pub mod types;
pub mod withdrawal;

// Re-exports: services
pub use accounts::{AccountError, AccountService};
pub use referral::{ReferralError, ReferralOutcome, ReferralService};
pub use withdrawal::{
    ConfirmationTracker, NewWithdrawal, Reconciler, TrackResult, WithdrawalError,
    WithdrawalReceipt, WithdrawalService,
};

// Re-exports: upstreams
pub use chain::{ChainError, ConfirmationSource, ConfirmationSources};
pub use payout::{NowPaymentsClient, PayoutProvider, ProviderError};
pub use rates::{CoinGeckoClient, RateSource};

// Re-exports: infrastructure
pub use common::{PtcConfig, PtcError};
pub use storage::{MemoryStore, SqliteStore, StorageError, Store};
pub use types::{Currency, SupportedCurrency, WithdrawalRecord, WithdrawalStatus};

/// Amount helpers
pub mod units {
    /// Decimal places kept on withdrawal amounts
    pub const AMOUNT_DECIMALS: i32 = 8;

    /// Round an amount to 8 decimal places
    pub fn normalize_amount(amount: f64) -> f64 {
        let scale = 10f64.powi(AMOUNT_DECIMALS);
        (amount * scale).round() / scale
    }

    /// Fixed 8-decimal string, as payout providers expect
    pub fn format_amount(amount: f64) -> String {
        format!("{:.8}", amount)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_normalize_amount() {
            assert_eq!(normalize_amount(0.123456789), 0.12345679);
            assert_eq!(normalize_amount(1.0), 1.0);
            assert_eq!(normalize_amount(0.1 + 0.2), 0.3);
        }

        #[test]
        fn test_format_amount() {
            assert_eq!(format_amount(0.01), "0.01000000");
            assert_eq!(format_amount(25.5), "25.50000000");
        }
    }
}
