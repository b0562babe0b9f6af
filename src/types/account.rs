//! Account Types
//!
//! Server-owned point balances and the referral log.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated referral codes
pub const REFERRAL_CODE_LEN: usize = 6;

const REFERRAL_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A user's point account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    /// Code other users enter to credit this account
    pub referral_code: String,
    /// Spendable points
    pub points: u64,
    /// Lifetime points credited
    pub total_earned: u64,
    pub signup_bonus_claimed: bool,
    /// Referrer's user id, once a referral code was applied
    pub referred_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create an empty account with a fresh referral code
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            referral_code: generate_referral_code(),
            points: 0,
            total_earned: 0,
            signup_bonus_claimed: false,
            referred_by: None,
            created_at: Utc::now(),
        }
    }
}

/// Generate an uppercase base-36 referral code
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

/// Referral log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub referrer_id: String,
    pub referred_id: String,
    pub reward_points_referrer: u64,
    pub reward_points_referred: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_code_shape() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_new_account_is_empty() {
        let account = Account::new("user_1".to_string());
        assert_eq!(account.points, 0);
        assert!(!account.signup_bonus_claimed);
        assert!(account.referred_by.is_none());
    }
}
