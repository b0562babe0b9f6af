//! In-Memory Storage
//!
//! Backs tests and local development. Data is lost when the service
//! restarts. All tables sit behind one lock so compound mutations are
//! atomic with respect to each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{AccountStore, CurrencyRegistry, StorageError, StorageResult, WithdrawalLedger};
use crate::types::{Account, Referral, SupportedCurrency, WithdrawalRecord, WithdrawalStatus};

#[derive(Default)]
struct State {
    withdrawals: HashMap<String, WithdrawalRecord>,
    currencies: HashMap<String, SupportedCurrency>,
    accounts: HashMap<String, Account>,
    referrals: Vec<Referral>,
}

impl State {
    fn withdrawal_mut(&mut self, id: &str) -> StorageResult<&mut WithdrawalRecord> {
        self.withdrawals
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

/// In-memory store with the default currency registry
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a store seeded with the default currencies
    pub fn new() -> Self {
        let currencies = SupportedCurrency::defaults()
            .into_iter()
            .map(|c| (c.symbol.clone(), c))
            .collect();

        Self {
            state: Arc::new(RwLock::new(State {
                currencies,
                ..State::default()
            })),
        }
    }

    /// Create a store with an empty registry
    pub fn empty() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Number of withdrawal records
    pub async fn withdrawal_count(&self) -> usize {
        self.state.read().await.withdrawals.len()
    }

    /// Number of logged referrals
    pub async fn referral_count(&self) -> usize {
        self.state.read().await.referrals.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WithdrawalLedger for MemoryStore {
    async fn open_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<u64> {
        let mut state = self.state.write().await;

        if state.withdrawals.contains_key(&record.id) {
            return Err(StorageError::Duplicate(record.id.clone()));
        }

        let account = state
            .accounts
            .get_mut(&record.user_id)
            .ok_or_else(|| StorageError::NotFound(record.user_id.clone()))?;

        if account.points < record.points_deducted {
            return Err(StorageError::InsufficientPoints {
                user_id: record.user_id.clone(),
                required: record.points_deducted,
                available: account.points,
            });
        }

        account.points -= record.points_deducted;
        let balance = account.points;

        state.withdrawals.insert(record.id.clone(), record.clone());
        Ok(balance)
    }

    async fn complete_withdrawal(
        &self,
        id: &str,
        transaction_hash: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<WithdrawalRecord> {
        let mut state = self.state.write().await;
        let record = state.withdrawal_mut(id)?;
        record.mark_completed(transaction_hash.to_string(), at)?;
        Ok(record.clone())
    }

    async fn fail_withdrawal(
        &self,
        id: &str,
        error: &str,
        refund: bool,
    ) -> StorageResult<WithdrawalRecord> {
        let mut state = self.state.write().await;
        let record = state.withdrawal_mut(id)?;
        record.mark_failed(error.to_string())?;
        let record = record.clone();

        if refund {
            if let Some(account) = state.accounts.get_mut(&record.user_id) {
                account.points += record.points_deducted;
            }
        }

        Ok(record)
    }

    async fn record_confirmations(&self, id: &str, confirmations: u32) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let record = state.withdrawal_mut(id)?;
        record.blockchain_confirmations = confirmations;
        Ok(())
    }

    async fn get_withdrawal(&self, id: &str) -> StorageResult<Option<WithdrawalRecord>> {
        Ok(self.state.read().await.withdrawals.get(id).cloned())
    }

    async fn get_by_transaction_hash(
        &self,
        hash: &str,
    ) -> StorageResult<Option<WithdrawalRecord>> {
        let state = self.state.read().await;
        Ok(state
            .withdrawals
            .values()
            .find(|w| w.transaction_hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<WithdrawalRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> StorageResult<Vec<WithdrawalRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| w.status == WithdrawalStatus::Processing && w.created_at < older_than)
            .cloned()
            .collect();

        records.sort_by_key(|w| w.created_at);
        Ok(records)
    }
}

#[async_trait]
impl CurrencyRegistry for MemoryStore {
    async fn get_currency(&self, symbol: &str) -> StorageResult<Option<SupportedCurrency>> {
        Ok(self.state.read().await.currencies.get(symbol).cloned())
    }

    async fn list_currencies(&self) -> StorageResult<Vec<SupportedCurrency>> {
        let mut currencies: Vec<_> = self.state.read().await.currencies.values().cloned().collect();
        currencies.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(currencies)
    }

    async fn upsert_currency(&self, currency: &SupportedCurrency) -> StorageResult<()> {
        self.state
            .write()
            .await
            .currencies
            .insert(currency.symbol.clone(), currency.clone());
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: &Account) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if state.accounts.contains_key(&account.user_id) {
            return Err(StorageError::Duplicate(account.user_id.clone()));
        }
        if state
            .accounts
            .values()
            .any(|a| a.referral_code == account.referral_code)
        {
            return Err(StorageError::Duplicate(account.referral_code.clone()));
        }

        state.accounts.insert(account.user_id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, user_id: &str) -> StorageResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(user_id).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> StorageResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.referral_code == code)
            .cloned())
    }

    async fn claim_signup_bonus(&self, user_id: &str, bonus: u64) -> StorageResult<Account> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;

        if account.signup_bonus_claimed {
            return Err(StorageError::Duplicate(format!("signup bonus for {}", user_id)));
        }

        account.signup_bonus_claimed = true;
        account.points += bonus;
        account.total_earned += bonus;
        Ok(account.clone())
    }

    async fn apply_referral(&self, referral: &Referral) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if !state.accounts.contains_key(&referral.referrer_id) {
            return Err(StorageError::NotFound(referral.referrer_id.clone()));
        }

        let referred = state
            .accounts
            .get_mut(&referral.referred_id)
            .ok_or_else(|| StorageError::NotFound(referral.referred_id.clone()))?;

        if referred.referred_by.is_some() {
            return Err(StorageError::Duplicate(referral.referred_id.clone()));
        }

        referred.referred_by = Some(referral.referrer_id.clone());
        referred.points += referral.reward_points_referred;
        referred.total_earned += referral.reward_points_referred;

        if let Some(referrer) = state.accounts.get_mut(&referral.referrer_id) {
            referrer.points += referral.reward_points_referrer;
            referrer.total_earned += referral.reward_points_referrer;
        }

        state.referrals.push(referral.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn funded(store: &MemoryStore, user_id: &str, points: u64) {
        let mut account = Account::new(user_id.to_string());
        account.points = points;
        store.create_account(&account).await.unwrap();
    }

    fn btc_withdrawal(user_id: &str, points: u64) -> WithdrawalRecord {
        WithdrawalRecord::new(
            user_id.to_string(),
            "BTC".to_string(),
            0.01,
            points,
            "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh".to_string(),
            0.0001,
            60_000.0,
        )
    }

    #[tokio::test]
    async fn test_seeded_registry() {
        let store = MemoryStore::new();
        let btc = store.get_currency("BTC").await.unwrap().unwrap();
        assert_eq!(btc.confirmations_required, 2);
        assert_eq!(store.list_currencies().await.unwrap().len(), 6);
        assert!(MemoryStore::empty().get_currency("BTC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_debits_balance() {
        let store = MemoryStore::new();
        funded(&store, "alice", 50_000).await;

        let record = btc_withdrawal("alice", 10_000);
        assert_eq!(store.open_withdrawal(&record).await.unwrap(), 40_000);
        assert_eq!(store.get_account("alice").await.unwrap().unwrap().points, 40_000);
        assert!(store.get_withdrawal(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_insufficient_creates_nothing() {
        let store = MemoryStore::new();
        funded(&store, "bob", 5_000).await;

        let result = store.open_withdrawal(&btc_withdrawal("bob", 10_000)).await;
        assert!(matches!(
            result,
            Err(StorageError::InsufficientPoints { required: 10_000, available: 5_000, .. })
        ));
        assert_eq!(store.withdrawal_count().await, 0);
        assert_eq!(store.get_account("bob").await.unwrap().unwrap().points, 5_000);
    }

    #[tokio::test]
    async fn test_fail_refunds_once() {
        let store = MemoryStore::new();
        funded(&store, "carol", 10_000).await;

        let record = btc_withdrawal("carol", 10_000);
        store.open_withdrawal(&record).await.unwrap();

        let failed = store.fail_withdrawal(&record.id, "rejected", true).await.unwrap();
        assert_eq!(failed.status, WithdrawalStatus::Failed);
        assert_eq!(store.get_account("carol").await.unwrap().unwrap().points, 10_000);

        // terminal, no second refund
        assert!(matches!(
            store.fail_withdrawal(&record.id, "again", true).await,
            Err(StorageError::InvalidTransition(_))
        ));
        assert_eq!(store.get_account("carol").await.unwrap().unwrap().points, 10_000);
    }

    #[tokio::test]
    async fn test_complete_and_lookup_by_hash() {
        let store = MemoryStore::new();
        funded(&store, "dave", 10_000).await;

        let record = btc_withdrawal("dave", 10_000);
        store.open_withdrawal(&record).await.unwrap();
        store
            .complete_withdrawal(&record.id, "tx-1", Utc::now())
            .await
            .unwrap();

        let found = store.get_by_transaction_hash("tx-1").await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(found.status, WithdrawalStatus::Completed);

        store.record_confirmations(&record.id, 3).await.unwrap();
        let found = store.get_withdrawal(&record.id).await.unwrap().unwrap();
        assert_eq!(found.blockchain_confirmations, 3);
    }

    #[tokio::test]
    async fn test_signup_bonus_once() {
        let store = MemoryStore::new();
        funded(&store, "erin", 0).await;

        let account = store.claim_signup_bonus("erin", 1_000_000).await.unwrap();
        assert_eq!(account.points, 1_000_000);
        assert!(matches!(
            store.claim_signup_bonus("erin", 1_000_000).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_referral_credits_both() {
        let store = MemoryStore::new();
        funded(&store, "referrer", 0).await;
        funded(&store, "newbie", 0).await;

        let referral = Referral {
            referrer_id: "referrer".to_string(),
            referred_id: "newbie".to_string(),
            reward_points_referrer: 250_000,
            reward_points_referred: 100_000,
            created_at: Utc::now(),
        };
        store.apply_referral(&referral).await.unwrap();

        assert_eq!(store.get_account("referrer").await.unwrap().unwrap().points, 250_000);
        let newbie = store.get_account("newbie").await.unwrap().unwrap();
        assert_eq!(newbie.points, 100_000);
        assert_eq!(newbie.referred_by.as_deref(), Some("referrer"));
        assert_eq!(store.referral_count().await, 1);

        assert!(matches!(
            store.apply_referral(&referral).await,
            Err(StorageError::Duplicate(_))
        ));
    }
}
