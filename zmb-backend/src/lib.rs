//! zmb-backend
//!
//! The HTTP facade the UI drives: recipient-hash derivation, balances,
//! withdrawal creation, claim-mode note consumption, and operator
//! visibility into quarantined deposits. The relayers' correctness depends
//! on these handlers writing only through the bridge store.

pub mod config;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use miden_objects::address::NetworkId;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use zmb_common::{amount, derive_recipient_hash, parse_account_id, DerivationError, Secret};
use zmb_miden::{MidenError, MidenRollup};
use zmb_store::BridgeStore;
use zmb_zcash::ZcashChain;

const CODE_MALFORMED_ACCOUNT_ID: &str = "MALFORMED_ACCOUNT_ID";
const CODE_MALFORMED_SECRET: &str = "MALFORMED_SECRET";
const CODE_DERIVATION_FAILED: &str = "DERIVATION_FAILED";
const CODE_INVALID_AMOUNT: &str = "INVALID_AMOUNT";
const CODE_INVALID_ADDRESS: &str = "INVALID_ADDRESS";
const CODE_ACCOUNT_NOT_READY: &str = "ACCOUNT_NOT_READY";
const CODE_UPSTREAM_UNAVAILABLE: &str = "UPSTREAM_UNAVAILABLE";
const CODE_INTERNAL: &str = "INTERNAL_SERVER_ERROR";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BridgeStore>,
    pub zcash: Arc<dyn ZcashChain>,
    pub miden: Arc<dyn MidenRollup>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, message)
    }
}

impl From<DerivationError> for ApiError {
    fn from(err: DerivationError) -> Self {
        let code = match err {
            DerivationError::MalformedAccountId(_) => CODE_MALFORMED_ACCOUNT_ID,
            DerivationError::MalformedSecret(_) => CODE_MALFORMED_SECRET,
            DerivationError::Recipient(_) => CODE_DERIVATION_FAILED,
        };
        Self::bad_request(code, err.to_string())
    }
}

impl From<zmb_store::StoreError> for ApiError {
    fn from(err: zmb_store::StoreError) -> Self {
        error!("store error in facade: {err}");
        Self::internal("bridge store unavailable")
    }
}

impl From<MidenError> for ApiError {
    fn from(err: MidenError) -> Self {
        match err {
            MidenError::AccountNotReady(msg) => {
                Self::bad_request(CODE_ACCOUNT_NOT_READY, msg)
            }
            err if err.is_transient() => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                CODE_UPSTREAM_UNAVAILABLE,
                err.to_string(),
            ),
            err => Self::internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    error_code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            error_code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/deposit/hash", get(deposit_hash_query).post(deposit_hash_json))
        .route("/account/balance", post(account_balance))
        .route("/pool/balance", post(pool_balance))
        .route("/withdrawal/create", post(withdrawal_create))
        .route("/note/consume", post(note_consume))
        .route("/account/create", post(account_create))
        .route("/operator/quarantine", get(operator_quarantine))
        .with_state(state)
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct HashQuery {
    account_id: Option<String>,
    secret: Option<String>,
}

#[derive(Deserialize)]
struct HashRequest {
    account_id: String,
    secret: String,
}

#[derive(Serialize)]
struct HashResponse {
    success: bool,
    recipient_hash: String,
}

async fn deposit_hash_query(
    State(state): State<AppState>,
    Query(params): Query<HashQuery>,
) -> Result<Json<HashResponse>, ApiError> {
    let account_id = params.account_id.ok_or_else(|| {
        ApiError::bad_request(CODE_MALFORMED_ACCOUNT_ID, "missing account_id parameter")
    })?;
    let secret = params.secret.ok_or_else(|| {
        ApiError::bad_request(CODE_MALFORMED_SECRET, "missing secret parameter")
    })?;
    derive_hash(&state, &account_id, &secret)
}

async fn deposit_hash_json(
    State(state): State<AppState>,
    Json(request): Json<HashRequest>,
) -> Result<Json<HashResponse>, ApiError> {
    derive_hash(&state, &request.account_id, &request.secret)
}

/// Shared by the GET and POST hash endpoints. The secret is parsed first
/// so its buffer lives as briefly as possible and is never persisted; the
/// intent row records only the account and the resulting hash.
fn derive_hash(
    state: &AppState,
    account_id_str: &str,
    secret_str: &str,
) -> Result<Json<HashResponse>, ApiError> {
    let secret = Secret::parse(secret_str)?;
    let account_id = parse_account_id(account_id_str)?;
    let recipient_hash = derive_recipient_hash(account_id, &secret)?;
    let hash_hex = recipient_hash.to_hex();

    state
        .store
        .upsert_intent(Some(account_id_str.trim()), None, &hash_hex)?;

    Ok(Json(HashResponse {
        success: true,
        recipient_hash: hash_hex,
    }))
}

#[derive(Deserialize)]
struct BalanceRequest {
    account_id: String,
}

#[derive(Serialize)]
struct BalanceResponse {
    success: bool,
    balance: String,
    balance_base: u64,
}

async fn account_balance(
    State(state): State<AppState>,
    Json(request): Json<BalanceRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account_id = parse_account_id(&request.account_id)?;
    let balance_base = state.miden.vault_balance(account_id).await?;
    Ok(Json(BalanceResponse {
        success: true,
        balance: amount::format_base(balance_base),
        balance_base,
    }))
}

async fn pool_balance(
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance_base = state.miden.bridge_balance().await?;
    Ok(Json(BalanceResponse {
        success: true,
        balance: amount::format_base(balance_base),
        balance_base,
    }))
}

#[derive(Deserialize)]
struct WithdrawalRequest {
    account_id: Option<String>,
    zcash_address: String,
    #[serde(alias = "amount_base")]
    amount: u64,
}

#[derive(Serialize)]
struct WithdrawalResponse {
    success: bool,
    transaction_id: String,
}

async fn withdrawal_create(
    State(state): State<AppState>,
    Json(request): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let dest = request.zcash_address.trim();
    if dest.is_empty() {
        return Err(ApiError::bad_request(
            CODE_INVALID_ADDRESS,
            "zcash_address must not be empty",
        ));
    }
    if request.amount == 0 {
        return Err(ApiError::bad_request(
            CODE_INVALID_AMOUNT,
            "amount must be positive",
        ));
    }

    let withdrawal =
        state
            .store
            .create_withdrawal(request.account_id.as_deref(), dest, request.amount)?;
    Ok(Json(WithdrawalResponse {
        success: true,
        transaction_id: withdrawal.id.to_string(),
    }))
}

#[derive(Deserialize)]
struct ConsumeRequest {
    account_id: String,
    secret: String,
    /// Accepted for wire compatibility; the engine drives a single
    /// configured faucet.
    #[serde(default)]
    faucet_id: Option<String>,
    #[serde(alias = "amount_base")]
    amount: u64,
}

#[derive(Serialize)]
struct ConsumeResponse {
    success: bool,
    transaction_id: String,
    note_id: String,
}

async fn note_consume(
    State(state): State<AppState>,
    Json(request): Json<ConsumeRequest>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    let secret = Secret::parse(&request.secret)?;
    let account_id = parse_account_id(&request.account_id)?;
    if let Some(faucet) = request.faucet_id.as_deref() {
        parse_account_id(faucet)?;
    }
    if request.amount == 0 {
        return Err(ApiError::bad_request(
            CODE_INVALID_AMOUNT,
            "amount must be positive",
        ));
    }

    let (transaction_id, note_id) = state
        .miden
        .claim_deposit_note(account_id, &secret, request.amount)
        .await?;
    Ok(Json(ConsumeResponse {
        success: true,
        transaction_id,
        note_id,
    }))
}

#[derive(Serialize)]
struct AccountCreateResponse {
    success: bool,
    account_id: String,
    account_id_hex: String,
}

async fn account_create(
    State(state): State<AppState>,
) -> Result<Json<AccountCreateResponse>, ApiError> {
    let account_id = state.miden.create_account().await?;
    Ok(Json(AccountCreateResponse {
        success: true,
        account_id: account_id.to_bech32(NetworkId::Testnet),
        account_id_hex: account_id.to_hex(),
    }))
}

#[derive(Serialize)]
struct QuarantinedDepositView {
    recipient_hash: String,
    source_txid: Option<String>,
    amount_base: Option<u64>,
    attempts: u32,
}

#[derive(Serialize)]
struct UnclaimableDepositView {
    source_txid: String,
    amount_base: u64,
    memo: Option<String>,
    reason: String,
}

#[derive(Serialize)]
struct QuarantineResponse {
    success: bool,
    quarantined: Vec<QuarantinedDepositView>,
    unclaimable: Vec<UnclaimableDepositView>,
}

async fn operator_quarantine(
    State(state): State<AppState>,
) -> Result<Json<QuarantineResponse>, ApiError> {
    let quarantined = state
        .store
        .quarantined_deposits()?
        .into_iter()
        .map(|intent| QuarantinedDepositView {
            recipient_hash: intent.recipient_hash,
            source_txid: intent.source_txid,
            amount_base: intent.amount_base,
            attempts: intent.attempts,
        })
        .collect();
    let unclaimable = state
        .store
        .unclaimable_deposits()?
        .into_iter()
        .map(|d| UnclaimableDepositView {
            source_txid: d.source_txid,
            amount_base: d.amount_base,
            memo: d.memo,
            reason: d.reason,
        })
        .collect();
    Ok(Json(QuarantineResponse {
        success: true,
        quarantined,
        unclaimable,
    }))
}
