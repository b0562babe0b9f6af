//! REST API for the PTC backend
//!
//! Endpoints:
//! - POST /api/withdrawals - Cash points out to a crypto address
//! - POST /api/referrals - Apply a referral code
//! - POST /api/transactions/track - Poll confirmations of a payout
//! - POST /api/accounts - Register an account
//! - GET  /api/accounts/:user_id - Read an account
//! - POST /api/accounts/:user_id/signup-bonus - Claim the sign-up bonus
//! - GET  /api/accounts/:user_id/withdrawals - Withdrawal history
//! - GET  /api/currencies - Active currencies
//! - GET  /api/health - Health check

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::accounts::AccountError;
use crate::referral::ReferralError;
use crate::storage::StorageError;
use crate::types::{Account, SupportedCurrency, WithdrawalRecord};
use crate::withdrawal::{NewWithdrawal, TrackResult, WithdrawalError, WithdrawalReceipt};

use super::middleware::{rate_limit_middleware, request_logging_middleware};
use super::server::SharedAppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    pub referral_code: String,
    pub new_user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub transaction_hash: String,
    pub currency: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub success: bool,
    #[serde(flatten)]
    pub receipt: WithdrawalReceipt,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: TrackResult,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub withdrawals: Vec<WithdrawalRecord>,
}

#[derive(Debug, Serialize)]
pub struct CurrenciesResponse {
    pub currencies: Vec<SupportedCurrency>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Any handler failure, rendered as `{error, code}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, code: &str) -> Self {
        Self {
            status,
            body: ErrorResponse::new(error, code),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(target: "ptc::api", code = %self.body.code, error = %self.body.error, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}

impl From<WithdrawalError> for ApiError {
    fn from(e: WithdrawalError) -> Self {
        Self::new(e.status_code(), e.to_string(), e.error_code())
    }
}

impl From<ReferralError> for ApiError {
    fn from(e: ReferralError) -> Self {
        let status = match &e {
            ReferralError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            ReferralError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string(), e.error_code())
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        let status = match &e {
            AccountError::NotFound(_) => StatusCode::NOT_FOUND,
            AccountError::AlreadyExists(_) | AccountError::BonusAlreadyClaimed => {
                StatusCode::BAD_REQUEST
            }
            AccountError::CodeSpaceExhausted | AccountError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string(), e.error_code())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORAGE_ERROR")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.body_text(), "INVALID_REQUEST")
    }
}

// =============================================================================
// API Handlers
// =============================================================================

/// POST /api/withdrawals
async fn handle_withdraw(
    State(state): State<SharedAppState>,
    body: Result<Json<NewWithdrawal>, JsonRejection>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let Json(request) = body?;
    let receipt = state.withdrawals.submit(&request).await?;

    Ok(Json(WithdrawResponse {
        success: true,
        receipt,
    }))
}

/// POST /api/referrals
async fn handle_referral(
    State(state): State<SharedAppState>,
    body: Result<Json<ReferralRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let outcome = state
        .referrals
        .apply(&request.referral_code, &request.new_user_id)
        .await?;

    Ok(Json(outcome))
}

/// POST /api/transactions/track
///
/// One confirmation lookup per call. Clients poll.
async fn handle_track(
    State(state): State<SharedAppState>,
    body: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let Json(request) = body?;
    let result = state
        .tracker
        .track(&request.transaction_hash, &request.currency)
        .await?;

    Ok(Json(TrackResponse {
        success: true,
        result,
    }))
}

/// POST /api/accounts
///
/// The body is optional; without a `user_id` one is generated.
async fn handle_register(
    State(state): State<SharedAppState>,
    body: Option<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let account = state.accounts.register(request.user_id).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts/:user_id
async fn handle_get_account(
    State(state): State<SharedAppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(state.accounts.get(&user_id).await?))
}

/// POST /api/accounts/:user_id/signup-bonus
async fn handle_signup_bonus(
    State(state): State<SharedAppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(state.accounts.claim_signup_bonus(&user_id).await?))
}

/// GET /api/accounts/:user_id/withdrawals?limit=
async fn handle_history(
    State(state): State<SharedAppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let withdrawals = state.accounts.history(&user_id, query.limit).await?;
    Ok(Json(HistoryResponse {
        user_id,
        withdrawals,
    }))
}

/// GET /api/currencies
async fn handle_currencies(
    State(state): State<SharedAppState>,
) -> Result<Json<CurrenciesResponse>, ApiError> {
    let currencies = state
        .store
        .list_currencies()
        .await?
        .into_iter()
        .filter(|c| c.is_active)
        .collect();

    Ok(Json(CurrenciesResponse { currencies }))
}

/// GET /api/health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ptc-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Router Setup
// =============================================================================

/// Create the API router with all endpoints
pub fn create_router(state: SharedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/withdrawals", post(handle_withdraw))
        .route("/api/referrals", post(handle_referral))
        .route("/api/transactions/track", post(handle_track))
        .route("/api/accounts", post(handle_register))
        .route("/api/accounts/:user_id", get(handle_get_account))
        .route("/api/accounts/:user_id/signup-bonus", post(handle_signup_bonus))
        .route("/api/accounts/:user_id/withdrawals", get(handle_history))
        .route("/api/currencies", get(handle_currencies))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(request_logging_middleware))
        // outermost, so pre-flight never counts against the limit
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================
