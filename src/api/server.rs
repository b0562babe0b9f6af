//! API Server Module
//!
//! Application state, wiring from configuration, and server startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::accounts::AccountService;
use crate::chain::ConfirmationSources;
use crate::common::config::PtcConfig;
use crate::common::error::PtcError;
use crate::payout::{NowPaymentsClient, PayoutProvider};
use crate::rates::{CoinGeckoClient, RateSource};
use crate::referral::ReferralService;
use crate::storage::Store;
use crate::withdrawal::{ConfirmationTracker, Reconciler, WithdrawalService};

use super::middleware::{create_rate_limiter, RateLimitState};
use super::routes::create_router;

/// Combined application state for all API endpoints
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub withdrawals: WithdrawalService,
    pub tracker: ConfirmationTracker,
    pub accounts: AccountService,
    pub referrals: ReferralService,
    pub rate_limiter: RateLimitState,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Build state with the live upstream clients named by the configuration
    pub fn new(config: &PtcConfig, store: Arc<dyn Store>) -> SharedAppState {
        let mut payouts =
            NowPaymentsClient::new(&config.nowpayments_url, config.nowpayments_api_key.clone())
                .with_timeout(Duration::from_secs(config.payout_timeout_secs));
        if let Some(url) = &config.payout_callback_url {
            payouts = payouts.with_callback_url(url.clone());
        }

        Self::from_parts(
            config,
            store,
            Arc::new(
                CoinGeckoClient::new(&config.coingecko_url)
                    .with_timeout(Duration::from_secs(config.http_timeout_secs)),
            ),
            Arc::new(payouts),
            ConfirmationSources::from_config(config),
        )
    }

    /// Build state around caller-supplied upstreams
    pub fn from_parts(
        config: &PtcConfig,
        store: Arc<dyn Store>,
        rates: Arc<dyn RateSource>,
        payouts: Arc<dyn PayoutProvider>,
        sources: ConfirmationSources,
    ) -> SharedAppState {
        Arc::new(Self {
            withdrawals: WithdrawalService::new(store.clone(), rates, payouts)
                .with_required_exchange_rate(config.require_exchange_rate),
            tracker: ConfirmationTracker::new(store.clone(), sources),
            accounts: AccountService::new(store.clone(), config.signup_bonus),
            referrals: ReferralService::new(
                store.clone(),
                config.referrer_reward,
                config.referred_reward,
            ),
            rate_limiter: create_rate_limiter(config.rate_limit_per_minute),
            store,
        })
    }
}

/// Start the API server with the stale-withdrawal reconciler alongside
pub async fn start_server(config: &PtcConfig, store: Arc<dyn Store>) -> Result<(), PtcError> {
    let state = AppState::new(config, store.clone());

    let reconciler = Arc::new(Reconciler::new(
        store,
        config.stale_withdrawal_secs,
        config.reconcile_interval_secs,
    ));
    tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run().await }
    });

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(120));
        loop {
            ticker.tick().await;
            limiter.cleanup().await;
        }
    });

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(target: "ptc::api", %addr, "PTC API listening");

    let result = axum::serve(listener, app).await;
    reconciler.stop().await;
    result.map_err(PtcError::from)
}
