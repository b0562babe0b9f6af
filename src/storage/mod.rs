//! Storage Layer Module
//!
//! Persistence for withdrawals, the currency registry, accounts and
//! referrals.
//!
//! - Storage trait definitions
//! - SQLite implementation for production
//! - In-memory implementation for tests and development

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AccountStore, CurrencyRegistry, StorageError, StorageResult, Store, WithdrawalLedger,
};
