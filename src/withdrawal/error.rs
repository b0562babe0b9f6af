//! Withdrawal errors
//!
//! `RateUnavailable` is the only soft failure; everything else aborts the
//! request. Codes and statuses are what the HTTP layer reports.

use axum::http::StatusCode;

use crate::chain::ChainError;
use crate::payout::ProviderError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum WithdrawalError {
    #[error("Invalid cryptocurrency address.")]
    InvalidAddress { currency: String, address: String },

    #[error("Unsupported cryptocurrency: {0}")]
    UnsupportedCurrency(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("amount too small: min {min}, got {got}")]
    AmountTooSmall { min: f64, got: f64 },

    #[error("points mismatch: withdrawal costs {expected} points, request says {got}")]
    PointsMismatch { expected: u64, got: u64 },

    #[error("insufficient points: need {required}, have {available}")]
    InsufficientPoints { required: u64, available: u64 },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("exchange rate unavailable for {0}")]
    RateUnavailable(String),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Transaction not found")]
    TransactionNotFound(String),

    #[error("confirmation lookup failed: {0}")]
    ChainQuery(#[from] ChainError),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for WithdrawalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InsufficientPoints {
                required,
                available,
                ..
            } => WithdrawalError::InsufficientPoints {
                required,
                available,
            },
            other => WithdrawalError::Storage(other),
        }
    }
}

impl WithdrawalError {
    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            WithdrawalError::InvalidAddress { .. } => "INVALID_ADDRESS",
            WithdrawalError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            WithdrawalError::InvalidAmount(_) => "INVALID_AMOUNT",
            WithdrawalError::AmountTooSmall { .. } => "AMOUNT_TOO_SMALL",
            WithdrawalError::PointsMismatch { .. } => "POINTS_MISMATCH",
            WithdrawalError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            WithdrawalError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WithdrawalError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            WithdrawalError::Provider(_) => "PROVIDER_ERROR",
            WithdrawalError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            WithdrawalError::ChainQuery(_) => "CHAIN_QUERY_FAILED",
            WithdrawalError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WithdrawalError::AccountNotFound(_) | WithdrawalError::TransactionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            WithdrawalError::Provider(_) | WithdrawalError::ChainQuery(_) => {
                StatusCode::BAD_GATEWAY
            }
            WithdrawalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message_passes_through() {
        let err = WithdrawalError::from(ProviderError::Rejected("Insufficient balance".into()));
        assert_eq!(err.to_string(), "Insufficient balance");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = WithdrawalError::from(ProviderError::MissingApiKey);
        assert_eq!(err.to_string(), "NOWPAYMENTS_API_KEY is not set.");
    }

    #[test]
    fn test_storage_shortfall_becomes_domain_error() {
        let err = WithdrawalError::from(StorageError::InsufficientPoints {
            user_id: "u".into(),
            required: 10,
            available: 3,
        });
        assert!(matches!(
            err,
            WithdrawalError::InsufficientPoints { required: 10, available: 3 }
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = WithdrawalError::from(StorageError::Database("locked".into()));
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_statuses() {
        assert_eq!(
            WithdrawalError::TransactionNotFound("0x1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WithdrawalError::TransactionNotFound("0x1".into()).to_string(),
            "Transaction not found"
        );
    }
}
