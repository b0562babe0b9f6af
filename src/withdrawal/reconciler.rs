//! Stale Withdrawal Reconciler
//!
//! A record that stays `processing` past the timeout means the process died
//! between debit and the final write. The payout may or may not have been
//! accepted, so the record is failed without a refund and flagged for
//! manual review.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::common::logging::log_withdrawal_event;
use crate::storage::{StorageError, Store};

pub const STALE_MESSAGE: &str = "stale withdrawal: payout outcome unknown, manual review required";

pub struct Reconciler {
    store: Arc<dyn Store>,
    stale_after: Duration,
    interval: std::time::Duration,
    running: Arc<RwLock<bool>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, stale_after_secs: u64, interval_secs: u64) -> Self {
        Self {
            store,
            stale_after: Duration::seconds(stale_after_secs as i64),
            interval: std::time::Duration::from_secs(interval_secs.max(1)),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Fail every processing record older than the timeout. Returns their ids.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let cutoff = now - self.stale_after;
        let stale = self.store.list_stale_processing(cutoff).await?;
        let mut failed = Vec::with_capacity(stale.len());

        for record in stale {
            match self.store.fail_withdrawal(&record.id, STALE_MESSAGE, false).await {
                Ok(_) => {
                    log_withdrawal_event(
                        "withdrawal_stale",
                        &record.id,
                        &record.currency,
                        record.amount,
                        record.points_deducted,
                        None,
                        Some(STALE_MESSAGE),
                    );
                    failed.push(record.id);
                }
                // finished concurrently
                Err(StorageError::InvalidTransition(_)) => {}
                Err(e) => {
                    tracing::error!(
                        target: "ptc::reconciler",
                        withdrawal_id = %record.id,
                        error = %e,
                        "failed to close stale withdrawal"
                    );
                }
            }
        }

        Ok(failed)
    }

    /// Sweep on an interval until stopped
    pub async fn run(&self) {
        *self.running.write().await = true;

        tracing::info!(
            target: "ptc::reconciler",
            stale_after_secs = self.stale_after.num_seconds(),
            interval_secs = self.interval.as_secs(),
            "reconciler started"
        );

        while *self.running.read().await {
            match self.sweep_stale(Utc::now()).await {
                Ok(ids) if !ids.is_empty() => {
                    tracing::warn!(target: "ptc::reconciler", count = ids.len(), "stale withdrawals failed");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(target: "ptc::reconciler", error = %e, "sweep failed"),
            }

            tokio::time::sleep(self.interval).await;
        }

        tracing::info!(target: "ptc::reconciler", "reconciler stopped");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AccountStore, MemoryStore, WithdrawalLedger};
    use crate::types::{Account, WithdrawalRecord, WithdrawalStatus};

    async fn open(store: &MemoryStore, age_secs: i64) -> String {
        let mut record = WithdrawalRecord::new(
            "alice".to_string(),
            "TRX".to_string(),
            100.0,
            10_000,
            "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf".to_string(),
            1.0,
            0.1,
        );
        record.created_at = Utc::now() - Duration::seconds(age_secs);
        store.open_withdrawal(&record).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_sweeps_only_stale_processing() {
        let store = MemoryStore::new();
        let mut account = Account::new("alice".to_string());
        account.points = 30_000;
        store.create_account(&account).await.unwrap();

        let stale = open(&store, 3_600).await;
        let fresh = open(&store, 10).await;
        let done = open(&store, 3_600).await;
        store.complete_withdrawal(&done, "tx", Utc::now()).await.unwrap();

        let reconciler = Reconciler::new(Arc::new(store.clone()), 900, 60);
        let swept = reconciler.sweep_stale(Utc::now()).await.unwrap();
        assert_eq!(swept, vec![stale.clone()]);

        let record = store.get_withdrawal(&stale).await.unwrap().unwrap();
        assert_eq!(record.status, WithdrawalStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some(STALE_MESSAGE));

        // no refund for an unknown outcome
        assert_eq!(store.get_account("alice").await.unwrap().unwrap().points, 0);

        let fresh = store.get_withdrawal(&fresh).await.unwrap().unwrap();
        assert_eq!(fresh.status, WithdrawalStatus::Processing);

        assert!(reconciler.sweep_stale(Utc::now()).await.unwrap().is_empty());
    }
}
