//! Withdrawal Types
//!
//! Ledger records for point-to-crypto withdrawals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a withdrawal request
///
/// `Processing` is the only non-terminal state. Records never re-enter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Points debited, payout submitted or about to be
    Processing,
    /// Payout accepted by the provider
    Completed,
    /// Payout rejected, or abandoned by the reconciler
    Failed,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl Default for WithdrawalStatus {
    fn default() -> Self {
        Self::Processing
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown withdrawal status: {}", other)),
        }
    }
}

/// A single withdrawal attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Unique withdrawal ID
    pub id: String,
    /// Owning account
    pub user_id: String,
    /// Currency symbol
    pub currency: String,
    /// Payout amount, normalised to 8 decimals
    pub amount: f64,
    /// Points charged for this request, fixed at creation
    pub points_deducted: u64,
    /// Destination address
    pub crypto_address: String,
    /// Current status
    pub status: WithdrawalStatus,
    /// Provider transaction id (once completed)
    pub transaction_hash: Option<String>,
    /// Registry network fee at request time
    pub network_fee: f64,
    /// USD price at request time (0 when unavailable)
    pub exchange_rate: f64,
    /// `amount * exchange_rate`
    pub usd_value: f64,
    /// Last observed confirmation count
    pub blockchain_confirmations: u32,
    /// Error message if failed
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WithdrawalRecord {
    /// Create a new record in `processing`, snapshotting the quote
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        currency: String,
        amount: f64,
        points_deducted: u64,
        crypto_address: String,
        network_fee: f64,
        exchange_rate: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            currency,
            amount,
            points_deducted,
            crypto_address,
            status: WithdrawalStatus::Processing,
            transaction_hash: None,
            network_fee,
            exchange_rate,
            usd_value: amount * exchange_rate,
            blockchain_confirmations: 0,
            error_message: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
        }
    }

    /// Mark as completed with the provider transaction id
    pub fn mark_completed(
        &mut self,
        transaction_hash: String,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.ensure_processing(WithdrawalStatus::Completed)?;
        self.transaction_hash = Some(transaction_hash);
        self.status = WithdrawalStatus::Completed;
        self.processed_at = Some(at);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Mark as failed
    pub fn mark_failed(&mut self, error: String) -> Result<(), InvalidTransition> {
        self.ensure_processing(WithdrawalStatus::Failed)?;
        self.error_message = Some(error);
        self.status = WithdrawalStatus::Failed;
        Ok(())
    }

    fn ensure_processing(&self, to: WithdrawalStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

/// Attempted to move a record out of a terminal state
#[derive(Debug, Clone, thiserror::Error)]
#[error("withdrawal {id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub id: String,
    pub from: WithdrawalStatus,
    pub to: WithdrawalStatus,
}
