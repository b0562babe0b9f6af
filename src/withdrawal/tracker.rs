//! Confirmation Tracker
//!
//! Answers "how final is this payout?" for a transaction hash. Each call
//! asks the currency's chain source once and persists the observed count;
//! polling cadence belongs to the caller.

use serde::Serialize;
use std::sync::Arc;

use crate::chain::{ChainError, ConfirmationSources};
use crate::storage::Store;
use crate::types::{Currency, WithdrawalStatus};

use super::error::WithdrawalError;

/// Confirmation snapshot for one transaction
#[derive(Debug, Clone, Serialize)]
pub struct TrackResult {
    pub transaction_hash: String,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub is_confirmed: bool,
    pub status: WithdrawalStatus,
    pub explorer_url: String,
}

pub struct ConfirmationTracker {
    store: Arc<dyn Store>,
    sources: ConfirmationSources,
}

impl ConfirmationTracker {
    pub fn new(store: Arc<dyn Store>, sources: ConfirmationSources) -> Self {
        Self { store, sources }
    }

    pub async fn track(
        &self,
        transaction_hash: &str,
        currency: &str,
    ) -> Result<TrackResult, WithdrawalError> {
        let record = self
            .store
            .get_by_transaction_hash(transaction_hash)
            .await?
            .ok_or_else(|| WithdrawalError::TransactionNotFound(transaction_hash.to_string()))?;

        let currency: Currency = currency
            .parse()
            .map_err(|_| WithdrawalError::UnsupportedCurrency(currency.to_string()))?;

        // the hash must be checked on the chain it was paid out on
        if !record.currency.eq_ignore_ascii_case(currency.symbol()) {
            return Err(WithdrawalError::UnsupportedCurrency(currency.symbol().to_string()));
        }

        let source = self
            .sources
            .get(currency)
            .ok_or(ChainError::NoSource(currency))?;

        let confirmations = source.confirmations(transaction_hash).await?;

        if confirmations < record.blockchain_confirmations {
            // reorg or a lagging node; the new count is stored as observed
            tracing::warn!(
                target: "ptc::confirmation",
                withdrawal_id = %record.id,
                tx = transaction_hash,
                previous = record.blockchain_confirmations,
                observed = confirmations,
                source = source.name(),
                "confirmation count went down"
            );
        }

        self.store
            .record_confirmations(&record.id, confirmations)
            .await?;

        let required_confirmations = self
            .store
            .get_currency(currency.symbol())
            .await?
            .map(|c| c.required_confirmations())
            .unwrap_or(1);

        let is_confirmed = confirmations >= required_confirmations;

        tracing::debug!(
            target: "ptc::confirmation",
            tx = transaction_hash,
            confirmations,
            required_confirmations,
            is_confirmed,
            "confirmation poll"
        );

        Ok(TrackResult {
            transaction_hash: transaction_hash.to_string(),
            confirmations,
            required_confirmations,
            is_confirmed,
            status: record.status,
            explorer_url: currency.explorer_url(transaction_hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockConfirmationSource;
    use crate::storage::{AccountStore, CurrencyRegistry, MemoryStore, WithdrawalLedger};
    use crate::types::{Account, WithdrawalRecord};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store holding one completed BTC withdrawal paid out as `tx_hash`
    async fn store_with_payout(tx_hash: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let mut account = Account::new("alice".to_string());
        account.points = 10_000;
        store.create_account(&account).await.unwrap();

        let record = WithdrawalRecord::new(
            "alice".to_string(),
            "BTC".to_string(),
            0.01,
            10_000,
            "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh".to_string(),
            0.0001,
            60_000.0,
        );
        store.open_withdrawal(&record).await.unwrap();
        store
            .complete_withdrawal(&record.id, tx_hash, Utc::now())
            .await
            .unwrap();
        store
    }

    fn tracker(store: &MemoryStore, source: MockConfirmationSource) -> ConfirmationTracker {
        ConfirmationTracker::new(
            Arc::new(store.clone()),
            ConfirmationSources::new().with(Currency::Btc, Arc::new(source)),
        )
    }

    fn fixed(count: u32) -> MockConfirmationSource {
        let mut source = MockConfirmationSource::new();
        source.expect_confirmations().returning(move |_| Ok(count));
        source.expect_name().return_const("mock");
        source
    }

    #[tokio::test]
    async fn test_btc_reaches_finality() {
        let store = store_with_payout("btc-tx").await;

        let polls = AtomicU32::new(0);
        let mut source = MockConfirmationSource::new();
        source.expect_confirmations().returning(move |_| {
            // first poll sees the mempool, the next sees two blocks
            if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(0)
            } else {
                Ok(2)
            }
        });
        source.expect_name().return_const("mock");

        let tracker = tracker(&store, source);

        let first = tracker.track("btc-tx", "BTC").await.unwrap();
        assert_eq!(first.confirmations, 0);
        assert_eq!(first.required_confirmations, 2);
        assert!(!first.is_confirmed);
        assert_eq!(first.status, WithdrawalStatus::Completed);
        assert_eq!(first.explorer_url, "https://www.blockchain.com/btc/tx/btc-tx");

        let later = tracker.track("btc-tx", "BTC").await.unwrap();
        assert_eq!(later.confirmations, 2);
        assert!(later.is_confirmed);

        let record = store.get_by_transaction_hash("btc-tx").await.unwrap().unwrap();
        assert_eq!(record.blockchain_confirmations, 2);
    }

    #[tokio::test]
    async fn test_repoll_is_stable() {
        let store = store_with_payout("steady").await;
        let tracker = tracker(&store, fixed(1));

        let a = tracker.track("steady", "BTC").await.unwrap();
        let b = tracker.track("steady", "BTC").await.unwrap();
        assert_eq!(a.confirmations, b.confirmations);
        assert_eq!(a.is_confirmed, b.is_confirmed);
        assert!(!b.is_confirmed);
    }

    #[tokio::test]
    async fn test_equal_to_required_is_confirmed() {
        let store = store_with_payout("edge").await;
        assert!(tracker(&store, fixed(2)).track("edge", "BTC").await.unwrap().is_confirmed);
    }

    #[tokio::test]
    async fn test_required_defaults_to_one() {
        let store = store_with_payout("default").await;
        let mut btc = store.get_currency("BTC").await.unwrap().unwrap();
        btc.confirmations_required = 0;
        store.upsert_currency(&btc).await.unwrap();

        let result = tracker(&store, fixed(1)).track("default", "BTC").await.unwrap();
        assert_eq!(result.required_confirmations, 1);
        assert!(result.is_confirmed);
    }

    #[tokio::test]
    async fn test_decrease_is_persisted() {
        let store = store_with_payout("reorg").await;
        tracker(&store, fixed(3)).track("reorg", "BTC").await.unwrap();
        tracker(&store, fixed(1)).track("reorg", "BTC").await.unwrap();

        let record = store.get_by_transaction_hash("reorg").await.unwrap().unwrap();
        assert_eq!(record.blockchain_confirmations, 1);
    }

    #[tokio::test]
    async fn test_unknown_hash() {
        let store = MemoryStore::new();
        let mut source = MockConfirmationSource::new();
        source.expect_confirmations().never();

        let result = tracker(&store, source).track("nope", "BTC").await;
        assert!(matches!(result, Err(WithdrawalError::TransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_chain_failure_surfaces() {
        let store = store_with_payout("flaky").await;
        let mut source = MockConfirmationSource::new();
        source
            .expect_confirmations()
            .returning(|_| Err(ChainError::Node("timeout".into())));
        source.expect_name().return_const("mock");

        let result = tracker(&store, source).track("flaky", "BTC").await;
        assert!(matches!(result, Err(WithdrawalError::ChainQuery(_))));
    }

    #[tokio::test]
    async fn test_currency_mismatch_rejected() {
        let store = store_with_payout("btc-paid").await;

        let mut source = MockConfirmationSource::new();
        source.expect_confirmations().never();
        let result = tracker(&store, source).track("btc-paid", "ETH").await;

        assert!(matches!(
            result,
            Err(WithdrawalError::UnsupportedCurrency(s)) if s == "ETH"
        ));
        let record = store.get_by_transaction_hash("btc-paid").await.unwrap().unwrap();
        assert_eq!(record.blockchain_confirmations, 0);
    }

    #[tokio::test]
    async fn test_currency_without_source() {
        let store = store_with_payout("btc-sourceless").await;
        let tracker = ConfirmationTracker::new(
            Arc::new(store.clone()),
            ConfirmationSources::new().with(Currency::Eth, Arc::new(fixed(1))),
        );

        let result = tracker.track("btc-sourceless", "btc").await;
        assert!(matches!(
            result,
            Err(WithdrawalError::ChainQuery(ChainError::NoSource(Currency::Btc)))
        ));
    }
}
