//! Environment-based Configuration for the PTC Backend
//!
//! Secrets (the payout API key) only ever come from the environment. A `.env`
//! file in the working directory is loaded first when present.
//!
//! # Environment Variables
//!
//! ## Service
//! - `PTC_ENV` - "development", "staging" or "production" (default: "development")
//! - `PTC_API_PORT` - HTTP port (default: 3001)
//! - `PTC_DATABASE_PATH` - SQLite file (default: "data/ptc.db")
//!
//! ## Upstreams
//! - `NOWPAYMENTS_API_URL` - Payout provider base URL
//! - `NOWPAYMENTS_API_KEY` - Payout provider key (required in production)
//! - `PTC_PAYOUT_CALLBACK_URL` - IPN callback handed to the provider
//! - `PTC_COINGECKO_URL` - Exchange rate API base URL
//! - `PTC_REQUIRE_EXCHANGE_RATE` - "1"/"true" rejects withdrawals without a rate
//!
//! ## Confirmations
//! - `PTC_CONFIRMATION_SOURCE` - "live" or "simulated" (simulated is refused in production)
//! - `PTC_ESPLORA_URL`, `PTC_BLOCKCYPHER_URL`, `PTC_ETH_RPC_URL`, `PTC_TRONGRID_URL`
//!
//! ## Rewards
//! - `PTC_REFERRER_REWARD` (250000), `PTC_REFERRED_REWARD` (100000),
//!   `PTC_SIGNUP_BONUS` (1000000)
//!
//! ## Operations
//! - `PTC_STALE_WITHDRAWAL_SECS` (900), `PTC_RECONCILE_INTERVAL_SECS` (60)
//! - `PTC_PAYOUT_TIMEOUT_SECS` (30, must be below the stale window),
//!   `PTC_HTTP_TIMEOUT_SECS` (10) for rate and chain queries
//! - `PTC_RATE_LIMIT_PER_MINUTE` (60)
//! - `PTC_LOG_LEVEL` (info), `PTC_LOG_JSON` (defaults to on in production)

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::chain::{blockcypher, esplora, tron};
use crate::payout::NOWPAYMENTS_URL;
use crate::rates::COINGECKO_URL;

pub const DEFAULT_API_PORT: u16 = 3001;
pub const DEFAULT_DATABASE_PATH: &str = "data/ptc.db";
pub const DEFAULT_ETH_RPC_URL: &str = "https://cloudflare-eth.com";

pub const DEFAULT_REFERRER_REWARD: u64 = 250_000;
pub const DEFAULT_REFERRED_REWARD: u64 = 100_000;
pub const DEFAULT_SIGNUP_BONUS: u64 = 1_000_000;

pub const DEFAULT_STALE_WITHDRAWAL_SECS: u64 = 900;
pub const DEFAULT_PAYOUT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("environment mismatch: expected {0}, got {1}")]
    EnvironmentMismatch(String, String),

    #[error("simulated confirmations not allowed in {0}")]
    SimulationNotAllowed(String),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(
                "PTC_ENV".to_string(),
                format!("unknown environment: {}", s),
            )),
        }
    }
}

impl Environment {
    pub fn allows_simulation(&self) -> bool {
        !matches!(self, Environment::Production)
    }
}

/// Where confirmation counts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    /// Per-chain explorers and nodes
    Live,
    /// Random counts, development only
    Simulated,
}

impl FromStr for ConfirmationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(ConfirmationMode::Live),
            "simulated" | "sim" => Ok(ConfirmationMode::Simulated),
            _ => Err(ConfigError::InvalidValue(
                "PTC_CONFIRMATION_SOURCE".to_string(),
                format!("unknown mode: {} (use 'live' or 'simulated')", s),
            )),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct PtcConfig {
    pub environment: Environment,
    pub api_port: u16,
    pub database_path: String,

    /// NOWPayments base URL
    pub nowpayments_url: String,
    pub nowpayments_api_key: Option<String>,
    pub payout_callback_url: Option<String>,

    pub coingecko_url: String,
    /// Reject withdrawals when no USD rate is available
    pub require_exchange_rate: bool,

    pub confirmation_mode: ConfirmationMode,
    pub esplora_url: String,
    pub blockcypher_url: String,
    pub eth_rpc_url: String,
    pub trongrid_url: String,

    pub referrer_reward: u64,
    pub referred_reward: u64,
    pub signup_bonus: u64,

    /// Age after which a `processing` withdrawal is failed by the reconciler
    pub stale_withdrawal_secs: u64,
    pub reconcile_interval_secs: u64,

    /// Upper bound on a payout submission; below `stale_withdrawal_secs` so
    /// the reconciler never races a live request
    pub payout_timeout_secs: u64,
    /// Upper bound on rate and confirmation queries
    pub http_timeout_secs: u64,

    /// Requests per client per minute
    pub rate_limit_per_minute: u32,

    pub log_level: String,
    pub log_json: bool,
}

impl PtcConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = var("PTC_ENV")
            .unwrap_or_else(|| "development".to_string())
            .parse()?;

        let confirmation_mode = match var("PTC_CONFIRMATION_SOURCE") {
            Some(v) => v.parse()?,
            None if environment.allows_simulation() => ConfirmationMode::Simulated,
            None => ConfirmationMode::Live,
        };
        if confirmation_mode == ConfirmationMode::Simulated && !environment.allows_simulation() {
            return Err(ConfigError::SimulationNotAllowed(format!("{:?}", environment)));
        }

        let nowpayments_api_key = var("NOWPAYMENTS_API_KEY").filter(|k| !k.is_empty());
        if nowpayments_api_key.is_none() && environment == Environment::Production {
            return Err(ConfigError::MissingEnvVar("NOWPAYMENTS_API_KEY".to_string()));
        }

        let log_json = match var("PTC_LOG_JSON") {
            Some(v) => parse_flag("PTC_LOG_JSON", &v)?,
            None => environment == Environment::Production,
        };

        let require_exchange_rate = match var("PTC_REQUIRE_EXCHANGE_RATE") {
            Some(v) => parse_flag("PTC_REQUIRE_EXCHANGE_RATE", &v)?,
            None => false,
        };

        let stale_withdrawal_secs = parse_or(
            "PTC_STALE_WITHDRAWAL_SECS",
            var("PTC_STALE_WITHDRAWAL_SECS"),
            DEFAULT_STALE_WITHDRAWAL_SECS,
        )?;
        let payout_timeout_secs = parse_or(
            "PTC_PAYOUT_TIMEOUT_SECS",
            var("PTC_PAYOUT_TIMEOUT_SECS"),
            DEFAULT_PAYOUT_TIMEOUT_SECS,
        )?;
        if payout_timeout_secs == 0 || payout_timeout_secs >= stale_withdrawal_secs {
            return Err(ConfigError::InvalidValue(
                "PTC_PAYOUT_TIMEOUT_SECS".to_string(),
                format!(
                    "must be between 1 and {} (the stale window), got {}",
                    stale_withdrawal_secs.saturating_sub(1),
                    payout_timeout_secs
                ),
            ));
        }
        let http_timeout_secs = parse_or(
            "PTC_HTTP_TIMEOUT_SECS",
            var("PTC_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?
        .max(1);

        Ok(Self {
            environment,
            api_port: parse_or("PTC_API_PORT", var("PTC_API_PORT"), DEFAULT_API_PORT)?,
            database_path: var("PTC_DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            nowpayments_url: var("NOWPAYMENTS_API_URL")
                .unwrap_or_else(|| NOWPAYMENTS_URL.to_string()),
            nowpayments_api_key,
            payout_callback_url: var("PTC_PAYOUT_CALLBACK_URL").filter(|u| !u.is_empty()),
            coingecko_url: var("PTC_COINGECKO_URL").unwrap_or_else(|| COINGECKO_URL.to_string()),
            require_exchange_rate,
            confirmation_mode,
            esplora_url: var("PTC_ESPLORA_URL")
                .unwrap_or_else(|| esplora::MAINNET_URL.to_string()),
            blockcypher_url: var("PTC_BLOCKCYPHER_URL")
                .unwrap_or_else(|| blockcypher::BLOCKCYPHER_URL.to_string()),
            eth_rpc_url: var("PTC_ETH_RPC_URL").unwrap_or_else(|| DEFAULT_ETH_RPC_URL.to_string()),
            trongrid_url: var("PTC_TRONGRID_URL").unwrap_or_else(|| tron::TRONGRID_URL.to_string()),
            referrer_reward: parse_or(
                "PTC_REFERRER_REWARD",
                var("PTC_REFERRER_REWARD"),
                DEFAULT_REFERRER_REWARD,
            )?,
            referred_reward: parse_or(
                "PTC_REFERRED_REWARD",
                var("PTC_REFERRED_REWARD"),
                DEFAULT_REFERRED_REWARD,
            )?,
            signup_bonus: parse_or("PTC_SIGNUP_BONUS", var("PTC_SIGNUP_BONUS"), DEFAULT_SIGNUP_BONUS)?,
            stale_withdrawal_secs,
            reconcile_interval_secs: parse_or(
                "PTC_RECONCILE_INTERVAL_SECS",
                var("PTC_RECONCILE_INTERVAL_SECS"),
                60,
            )?,
            payout_timeout_secs,
            http_timeout_secs,
            rate_limit_per_minute: parse_or(
                "PTC_RATE_LIMIT_PER_MINUTE",
                var("PTC_RATE_LIMIT_PER_MINUTE"),
                60,
            )?,
            log_level: var("PTC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json,
        })
    }

    /// Development defaults, no environment involved
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            api_port: DEFAULT_API_PORT,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            nowpayments_url: NOWPAYMENTS_URL.to_string(),
            nowpayments_api_key: None,
            payout_callback_url: None,
            coingecko_url: COINGECKO_URL.to_string(),
            require_exchange_rate: false,
            confirmation_mode: ConfirmationMode::Simulated,
            esplora_url: esplora::MAINNET_URL.to_string(),
            blockcypher_url: blockcypher::BLOCKCYPHER_URL.to_string(),
            eth_rpc_url: DEFAULT_ETH_RPC_URL.to_string(),
            trongrid_url: tron::TRONGRID_URL.to_string(),
            referrer_reward: DEFAULT_REFERRER_REWARD,
            referred_reward: DEFAULT_REFERRED_REWARD,
            signup_bonus: DEFAULT_SIGNUP_BONUS,
            stale_withdrawal_secs: DEFAULT_STALE_WITHDRAWAL_SECS,
            reconcile_interval_secs: 60,
            payout_timeout_secs: DEFAULT_PAYOUT_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            rate_limit_per_minute: 60,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Production {
            return Err(ConfigError::EnvironmentMismatch(
                "production".to_string(),
                format!("{:?}", self.environment),
            ));
        }

        if self.confirmation_mode == ConfirmationMode::Simulated {
            return Err(ConfigError::SimulationNotAllowed("production".to_string()));
        }

        if self.nowpayments_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("NOWPAYMENTS_API_KEY".to_string()));
        }

        Ok(())
    }

    /// Log configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        tracing::info!(
            target: "ptc::config",
            environment = ?self.environment,
            api_port = self.api_port,
            database = %self.database_path,
            payout_provider = %self.nowpayments_url,
            payout_key = if self.nowpayments_api_key.is_some() { "set" } else { "missing" },
            rates = %self.coingecko_url,
            require_exchange_rate = self.require_exchange_rate,
            confirmations = ?self.confirmation_mode,
            stale_after_secs = self.stale_withdrawal_secs,
            payout_timeout_secs = self.payout_timeout_secs,
            "PTC configuration loaded"
        );
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("expected a boolean, got {}", value),
        )),
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("cannot parse {}", v))
        }),
        None => Ok(default),
    }
}
