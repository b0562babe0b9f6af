//! Account Service
//!
//! Server-owned point balances. Withdrawals debit these accounts, so the
//! balance a client shows is never the one that gets charged.

use std::sync::Arc;

use crate::storage::{StorageError, Store};
use crate::types::{Account, WithdrawalRecord};

/// Default page size for withdrawal history
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;

/// Attempts at drawing an unused referral code
const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("sign-up bonus already claimed")]
    BonusAlreadyClaimed,

    #[error("could not allocate a referral code")]
    CodeSpaceExhausted,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AccountError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AccountError::AlreadyExists(_) => "ACCOUNT_EXISTS",
            AccountError::NotFound(_) => "ACCOUNT_NOT_FOUND",
            AccountError::BonusAlreadyClaimed => "BONUS_ALREADY_CLAIMED",
            AccountError::CodeSpaceExhausted | AccountError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub struct AccountService {
    store: Arc<dyn Store>,
    signup_bonus: u64,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, signup_bonus: u64) -> Self {
        Self {
            store,
            signup_bonus,
        }
    }

    /// Create an account, generating a user id when none is given
    pub async fn register(&self, user_id: Option<String>) -> Result<Account, AccountError> {
        let user_id = user_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("user_{}", uuid::Uuid::new_v4().simple()));

        for _ in 0..CODE_ATTEMPTS {
            let account = Account::new(user_id.clone());
            match self.store.create_account(&account).await {
                Ok(()) => {
                    tracing::info!(
                        target: "ptc::account",
                        user_id = %account.user_id,
                        referral_code = %account.referral_code,
                        "account registered"
                    );
                    return Ok(account);
                }
                Err(StorageError::Duplicate(_)) => {
                    if self.store.get_account(&user_id).await?.is_some() {
                        return Err(AccountError::AlreadyExists(user_id));
                    }
                    // referral code collision, draw again
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AccountError::CodeSpaceExhausted)
    }

    pub async fn get(&self, user_id: &str) -> Result<Account, AccountError> {
        self.store
            .get_account(user_id)
            .await?
            .ok_or_else(|| AccountError::NotFound(user_id.to_string()))
    }

    /// Credit the one-time sign-up bonus
    pub async fn claim_signup_bonus(&self, user_id: &str) -> Result<Account, AccountError> {
        match self.store.claim_signup_bonus(user_id, self.signup_bonus).await {
            Ok(account) => Ok(account),
            Err(StorageError::NotFound(_)) => Err(AccountError::NotFound(user_id.to_string())),
            Err(StorageError::Duplicate(_)) => Err(AccountError::BonusAlreadyClaimed),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest withdrawals first
    pub async fn history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<WithdrawalRecord>, AccountError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        self.get(user_id).await?;
        Ok(self.store.list_for_user(user_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, WithdrawalLedger};

    fn service(store: &MemoryStore) -> AccountService {
        AccountService::new(Arc::new(store.clone()), 1_000_000)
    }

    #[tokio::test]
    async fn test_register_with_and_without_id() {
        let store = MemoryStore::new();
        let accounts = service(&store);

        let named = accounts.register(Some("alice".to_string())).await.unwrap();
        assert_eq!(named.user_id, "alice");
        assert_eq!(named.points, 0);
        assert_eq!(named.referral_code.len(), 6);

        let generated = accounts.register(None).await.unwrap();
        assert!(generated.user_id.starts_with("user_"));

        assert!(matches!(
            accounts.register(Some("alice".to_string())).await,
            Err(AccountError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_signup_bonus() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        accounts.register(Some("bob".to_string())).await.unwrap();

        let account = accounts.claim_signup_bonus("bob").await.unwrap();
        assert_eq!(account.points, 1_000_000);
        assert_eq!(account.total_earned, 1_000_000);

        assert!(matches!(
            accounts.claim_signup_bonus("bob").await,
            Err(AccountError::BonusAlreadyClaimed)
        ));
        assert!(matches!(
            accounts.claim_signup_bonus("nobody").await,
            Err(AccountError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = MemoryStore::new();
        let accounts = service(&store);
        accounts.register(Some("carol".to_string())).await.unwrap();
        accounts.claim_signup_bonus("carol").await.unwrap();

        let mut ids = Vec::new();
        for i in 0..12 {
            let mut record = WithdrawalRecord::new(
                "carol".to_string(),
                "USDT".to_string(),
                5.0,
                5_000,
                "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf".to_string(),
                1.0,
                1.0,
            );
            record.created_at = chrono::Utc::now() - chrono::Duration::minutes(60 - i);
            store.open_withdrawal(&record).await.unwrap();
            ids.push(record.id);
        }

        let history = accounts.history("carol", None).await.unwrap();
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history[0].id, ids[11]);

        assert_eq!(accounts.history("carol", Some(3)).await.unwrap().len(), 3);
        assert!(matches!(
            accounts.history("nobody", None).await,
            Err(AccountError::NotFound(_))
        ));
    }
}
