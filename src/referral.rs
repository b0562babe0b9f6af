//! Referral Service
//!
//! A new user enters someone's referral code; both sides get a fixed point
//! reward and the relation is logged. Each user can be referred once.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::storage::{StorageError, Store};
use crate::types::Referral;

pub const REFERRAL_APPLIED: &str = "Referral applied successfully!";

#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("invalid referral code: {0}")]
    InvalidReferralCode(String),

    #[error("cannot refer yourself")]
    SelfReferral,

    #[error("user already referred: {0}")]
    AlreadyReferred(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ReferralError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ReferralError::InvalidReferralCode(_) => "INVALID_REFERRAL_CODE",
            ReferralError::SelfReferral => "SELF_REFERRAL",
            ReferralError::AlreadyReferred(_) => "ALREADY_REFERRED",
            ReferralError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            ReferralError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralOutcome {
    pub success: bool,
    pub message: String,
    pub referrer_reward: u64,
    pub referred_reward: u64,
}

pub struct ReferralService {
    store: Arc<dyn Store>,
    referrer_reward: u64,
    referred_reward: u64,
}

impl ReferralService {
    pub fn new(store: Arc<dyn Store>, referrer_reward: u64, referred_reward: u64) -> Self {
        Self {
            store,
            referrer_reward,
            referred_reward,
        }
    }

    pub async fn apply(
        &self,
        referral_code: &str,
        new_user_id: &str,
    ) -> Result<ReferralOutcome, ReferralError> {
        let code = referral_code.trim().to_uppercase();

        let referrer = self
            .store
            .find_by_referral_code(&code)
            .await?
            .ok_or_else(|| ReferralError::InvalidReferralCode(referral_code.to_string()))?;

        if referrer.user_id == new_user_id {
            return Err(ReferralError::SelfReferral);
        }

        let referral = Referral {
            referrer_id: referrer.user_id.clone(),
            referred_id: new_user_id.to_string(),
            reward_points_referrer: self.referrer_reward,
            reward_points_referred: self.referred_reward,
            created_at: Utc::now(),
        };

        match self.store.apply_referral(&referral).await {
            Ok(()) => {}
            Err(StorageError::Duplicate(_)) => {
                return Err(ReferralError::AlreadyReferred(new_user_id.to_string()))
            }
            Err(StorageError::NotFound(id)) => return Err(ReferralError::AccountNotFound(id)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            target: "ptc::referral",
            referrer = %referral.referrer_id,
            referred = %referral.referred_id,
            "referral applied"
        );

        Ok(ReferralOutcome {
            success: true,
            message: REFERRAL_APPLIED.to_string(),
            referrer_reward: self.referrer_reward,
            referred_reward: self.referred_reward,
        })
    }
}
