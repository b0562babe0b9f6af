//! Shared Types Module
//!
//! Data types shared across the PTC backend.

pub mod account;
pub mod currency;
pub mod withdrawal;

// Re-exports for convenience
pub use account::{generate_referral_code, Account, Referral};
pub use currency::{explorer_url, Currency, SupportedCurrency, UnknownCurrency};
pub use withdrawal::{InvalidTransition, WithdrawalRecord, WithdrawalStatus};
