//! Storage Trait Definitions
//!
//! Abstract interfaces for the withdrawal ledger, the currency registry and
//! point accounts. Every compound mutation (debit + insert, fail + refund,
//! referral credit + log) is a single atomic call so callers never observe
//! half of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{Account, InvalidTransition, Referral, SupportedCurrency, WithdrawalRecord};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Insufficient points for {user_id}: need {required}, have {available}")]
    InsufficientPoints {
        user_id: String,
        required: u64,
        available: u64,
    },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Withdrawal records and the point debits that back them
#[async_trait]
pub trait WithdrawalLedger: Send + Sync {
    /// Debit `record.points_deducted` from the owner and insert the record,
    /// atomically. Returns the remaining balance.
    async fn open_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<u64>;

    /// Move a processing record to completed
    async fn complete_withdrawal(
        &self,
        id: &str,
        transaction_hash: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<WithdrawalRecord>;

    /// Move a processing record to failed, refunding its points when `refund`
    async fn fail_withdrawal(
        &self,
        id: &str,
        error: &str,
        refund: bool,
    ) -> StorageResult<WithdrawalRecord>;

    /// Persist the latest observed confirmation count
    async fn record_confirmations(&self, id: &str, confirmations: u32) -> StorageResult<()>;

    async fn get_withdrawal(&self, id: &str) -> StorageResult<Option<WithdrawalRecord>>;

    async fn get_by_transaction_hash(&self, hash: &str)
        -> StorageResult<Option<WithdrawalRecord>>;

    /// A user's withdrawals, newest first
    async fn list_for_user(&self, user_id: &str, limit: usize)
        -> StorageResult<Vec<WithdrawalRecord>>;

    /// Processing records created before `older_than`, oldest first
    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> StorageResult<Vec<WithdrawalRecord>>;
}

/// Supported currency reference data, keyed by symbol
#[async_trait]
pub trait CurrencyRegistry: Send + Sync {
    async fn get_currency(&self, symbol: &str) -> StorageResult<Option<SupportedCurrency>>;

    /// All rows, active or not, ordered by symbol
    async fn list_currencies(&self) -> StorageResult<Vec<SupportedCurrency>>;

    async fn upsert_currency(&self, currency: &SupportedCurrency) -> StorageResult<()>;
}

/// Point accounts and the referral log
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Duplicate user id or referral code is an error.
    async fn create_account(&self, account: &Account) -> StorageResult<()>;

    async fn get_account(&self, user_id: &str) -> StorageResult<Option<Account>>;

    async fn find_by_referral_code(&self, code: &str) -> StorageResult<Option<Account>>;

    /// Credit the sign-up bonus once. A second claim is `Duplicate`.
    async fn claim_signup_bonus(&self, user_id: &str, bonus: u64) -> StorageResult<Account>;

    /// Credit both parties, set `referred_by` and log the referral,
    /// atomically. A user can be referred only once.
    async fn apply_referral(&self, referral: &Referral) -> StorageResult<()>;
}

/// Everything the services need from persistence
pub trait Store: WithdrawalLedger + CurrencyRegistry + AccountStore {}

impl<T: WithdrawalLedger + CurrencyRegistry + AccountStore> Store for T {}
