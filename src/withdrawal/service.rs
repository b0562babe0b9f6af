//! Withdrawal Service
//!
//! Turns a point balance into a payout request.
//!
//! ```text
//! validate address -> registry lookup -> amount/points checks -> USD quote
//!   -> debit + insert `processing` (one atomic write)
//!   -> submit payout
//!        ok  -> `completed` with the provider transaction id
//!        rejected  -> `failed` + refund (one atomic write), error returned
//!        ambiguous -> `failed`, no refund, flagged for manual review
//! ```
//!
//! The payout is never retried. A crash between submit and the final write
//! leaves the record in `processing` for the reconciler.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::address;
use crate::common::logging::log_withdrawal_event;
use crate::payout::PayoutProvider;
use crate::rates::RateSource;
use crate::storage::{StorageError, Store};
use crate::types::{Currency, SupportedCurrency, WithdrawalRecord, WithdrawalStatus};
use crate::units;

use super::error::WithdrawalError;

/// Appended to the failure message when a payout may have gone out
pub const MANUAL_REVIEW: &str = "manual review required";

const FAIL_WRITE_ATTEMPTS: u32 = 2;

/// A user's request to cash out points
#[derive(Debug, Clone, Deserialize)]
pub struct NewWithdrawal {
    pub user_id: String,
    pub currency: String,
    pub amount: f64,
    /// Cost the client displayed; checked against the server's own
    #[serde(default)]
    pub points_deducted: Option<u64>,
    pub crypto_address: String,
}

/// Outcome of a successful submission
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub withdrawal_id: String,
    pub transaction_hash: String,
    pub status: WithdrawalStatus,
    pub explorer_url: String,
}

/// Validated parameters of a withdrawal, before any state is written
#[derive(Debug)]
struct Quote {
    currency: Currency,
    registry: SupportedCurrency,
    amount: f64,
    points: u64,
}

pub struct WithdrawalService {
    store: Arc<dyn Store>,
    rates: Arc<dyn RateSource>,
    payouts: Arc<dyn PayoutProvider>,
    /// Reject instead of recording a zero USD value
    require_exchange_rate: bool,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn Store>,
        rates: Arc<dyn RateSource>,
        payouts: Arc<dyn PayoutProvider>,
    ) -> Self {
        Self {
            store,
            rates,
            payouts,
            require_exchange_rate: false,
        }
    }

    pub fn with_required_exchange_rate(mut self, required: bool) -> Self {
        self.require_exchange_rate = required;
        self
    }

    /// Submit a withdrawal end to end
    pub async fn submit(&self, request: &NewWithdrawal) -> Result<WithdrawalReceipt, WithdrawalError> {
        let quote = self.quote(request).await?;

        let rate = self.rates.fetch_usd_rate(quote.currency).await;
        if rate <= 0.0 {
            if self.require_exchange_rate {
                return Err(WithdrawalError::RateUnavailable(quote.registry.symbol));
            }
            tracing::warn!(
                target: "ptc::withdrawal",
                currency = %quote.currency,
                "no USD rate, recording withdrawal with zero value"
            );
        }

        let record = WithdrawalRecord::new(
            request.user_id.clone(),
            quote.registry.symbol.clone(),
            quote.amount,
            quote.points,
            request.crypto_address.clone(),
            quote.registry.network_fee,
            rate.max(0.0),
        );

        let balance = match self.store.open_withdrawal(&record).await {
            Ok(balance) => balance,
            Err(StorageError::NotFound(_)) => {
                return Err(WithdrawalError::AccountNotFound(request.user_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            target: "ptc::withdrawal",
            withdrawal_id = %record.id,
            remaining_points = balance,
            "points debited"
        );
        log_withdrawal_event(
            "withdrawal_opened",
            &record.id,
            &record.currency,
            record.amount,
            record.points_deducted,
            None,
            None,
        );

        match self
            .payouts
            .submit_payout(&record.crypto_address, record.amount, quote.currency)
            .await
        {
            Ok(transaction_hash) => {
                let completed = self
                    .store
                    .complete_withdrawal(&record.id, &transaction_hash, Utc::now())
                    .await?;

                log_withdrawal_event(
                    "withdrawal_completed",
                    &completed.id,
                    &completed.currency,
                    completed.amount,
                    completed.points_deducted,
                    Some(&transaction_hash),
                    None,
                );

                Ok(WithdrawalReceipt {
                    withdrawal_id: completed.id,
                    explorer_url: quote.currency.explorer_url(&transaction_hash),
                    transaction_hash,
                    status: completed.status,
                })
            }
            Err(provider_err) => {
                // Refund only when the provider cannot have sent anything
                let refund = provider_err.is_definite_rejection();
                let message = if refund {
                    provider_err.to_string()
                } else {
                    format!("{}, {}", provider_err, MANUAL_REVIEW)
                };

                // record must say failed before the caller hears about it
                self.record_failure(&record, &message, refund).await;

                log_withdrawal_event(
                    "withdrawal_failed",
                    &record.id,
                    &record.currency,
                    record.amount,
                    record.points_deducted,
                    None,
                    Some(&message),
                );

                Err(provider_err.into())
            }
        }
    }

    /// Fail the record, retrying a storage error once
    async fn record_failure(&self, record: &WithdrawalRecord, message: &str, refund: bool) {
        let mut attempt = 0;
        let err = loop {
            attempt += 1;
            match self.store.fail_withdrawal(&record.id, message, refund).await {
                Ok(_) => return,
                // someone else already moved it out of processing
                Err(e @ StorageError::InvalidTransition(_)) => break e,
                Err(e) if attempt >= FAIL_WRITE_ATTEMPTS => break e,
                Err(e) => {
                    tracing::warn!(
                        target: "ptc::withdrawal",
                        withdrawal_id = %record.id,
                        attempt,
                        error = %e,
                        "fail write errored, retrying"
                    );
                }
            }
        };

        if refund {
            tracing::error!(
                target: "ptc::withdrawal",
                withdrawal_id = %record.id,
                user_id = %record.user_id,
                points_owed = record.points_deducted,
                error = %err,
                "could not mark withdrawal failed; refund owed"
            );
        } else {
            tracing::error!(
                target: "ptc::withdrawal",
                withdrawal_id = %record.id,
                error = %err,
                "could not mark withdrawal failed; left for reconciliation"
            );
        }
    }

    /// Everything that can be rejected without touching state
    async fn quote(&self, request: &NewWithdrawal) -> Result<Quote, WithdrawalError> {
        let currency: Currency = request
            .currency
            .parse()
            .map_err(|_| WithdrawalError::UnsupportedCurrency(request.currency.clone()))?;

        if !address::is_valid_address(&request.crypto_address, currency) {
            return Err(WithdrawalError::InvalidAddress {
                currency: currency.symbol().to_string(),
                address: request.crypto_address.clone(),
            });
        }

        let registry = self
            .store
            .get_currency(currency.symbol())
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| WithdrawalError::UnsupportedCurrency(currency.symbol().to_string()))?;

        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(WithdrawalError::InvalidAmount(request.amount));
        }

        let amount = units::normalize_amount(request.amount);
        if !amount.is_finite() {
            return Err(WithdrawalError::InvalidAmount(request.amount));
        }
        if amount < registry.min_withdrawal {
            return Err(WithdrawalError::AmountTooSmall {
                min: registry.min_withdrawal,
                got: amount,
            });
        }

        let points = match registry.points_for(amount) {
            Some(points) if points > 0 => points,
            _ => return Err(WithdrawalError::InvalidAmount(request.amount)),
        };

        if let Some(claimed) = request.points_deducted {
            if claimed != points {
                return Err(WithdrawalError::PointsMismatch {
                    expected: points,
                    got: claimed,
                });
            }
        }

        Ok(Quote {
            currency,
            registry,
            amount,
            points,
        })
    }
}
