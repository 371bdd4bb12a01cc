use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;
use agent_runner::address::Address;
use agent_runner::amount::from_raw_amount;
use agent_runner::capability::Capability;
use agent_runner::deposit::Deposit;
use agent_runner::signer::{LocalKeySigner, Signer};
use agent_runner::store::{CapabilityRecord, CapabilitySummary};

type ApiError = (StatusCode, String);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn parse_wallet(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| bad_request(format!("invalid wallet address: {}", e)))
}

/// POST /deposits - Record a user deposit for the agent to act on
pub async fn create_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDepositRequest>,
) -> Result<(StatusCode, Json<Deposit>), ApiError> {
    let wallet = parse_wallet(&req.wallet_address)?;
    if req.amount <= Decimal::ZERO {
        return Err(bad_request(format!(
            "deposit amount must be positive, got {}",
            req.amount
        )));
    }

    let deposit = state.deposits.create(wallet, req.amount).await;
    info!(
        "Deposit {} recorded for {} ({} stable)",
        deposit.deposit_id, deposit.wallet_address, deposit.amount
    );

    Ok((StatusCode::CREATED, Json(deposit)))
}

/// GET /deposits/{wallet} - Deposits for a wallet, newest first
pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<Deposit>>, ApiError> {
    let wallet = parse_wallet(&wallet)?;
    Ok(Json(state.deposits.list_for_wallet(&wallet).await))
}

/// GET /balances/{wallet} - Current on-chain stable/gold balances
pub async fn get_balances(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Result<Json<BalancesResponse>, ApiError> {
    let wallet = parse_wallet(&wallet)?;

    let balances = state.agent.balances(&wallet).await.map_err(|e| {
        warn!("Balance read for {} failed: {}", wallet, e);
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    let stable = from_raw_amount(balances.stable, state.stable_decimals)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let gold = from_raw_amount(balances.gold, state.gold_decimals)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(BalancesResponse {
        wallet_address: wallet,
        stable,
        gold,
    }))
}

/// POST /capabilities - Install capability material issued on the user's
/// device. The private key crosses the trust boundary here; see the
/// custody notes on `LocalKeySigner`.
pub async fn install_capability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InstallCapabilityRequest>,
) -> Result<(StatusCode, Json<CapabilitySummary>), ApiError> {
    let pkcs8 = hex::decode(&req.session_key_pkcs8)
        .map_err(|e| bad_request(format!("invalid key hex: {}", e)))?;
    let signer =
        LocalKeySigner::from_pkcs8(&pkcs8).map_err(|e| bad_request(format!("invalid key: {}", e)))?;

    // The uploaded key must actually be the capability's session key.
    if signer.address() != req.capability.session_address {
        return Err(bad_request(
            "session key does not match capability session address",
        ));
    }
    if req.capability.is_expired_at(chrono::Utc::now()) {
        return Err(bad_request("capability is already expired"));
    }

    let capability = req.capability;
    info!(
        "Installing capability {} for {} (expires {})",
        capability.session_key_id, capability.owner_account, capability.expires_at
    );

    let summary = CapabilitySummary {
        owner_account: capability.owner_account.clone(),
        session_address: capability.session_address.clone(),
        issued_at: capability.issued_at,
        expires_at: capability.expires_at,
        status: capability.status,
    };

    state
        .capabilities
        .put(CapabilityRecord {
            capability,
            signer: Arc::new(signer),
        })
        .await;

    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /capabilities - Public metadata of stored capabilities. Never
/// returns key material.
pub async fn list_capabilities(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<CapabilitySummary>> {
    Json(state.capabilities.list().await)
}

/// DELETE /capabilities/{account} - Revoke ahead of natural expiry
pub async fn revoke_capability(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Result<StatusCode, ApiError> {
    let account = parse_wallet(&account)?;
    if state.capabilities.revoke(&account).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            format!("no capability for {}", account),
        ))
    }
}

/// GET /health - Service health check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
    })
}

// Request/Response types

#[derive(Debug, serde::Deserialize)]
pub struct CreateDepositRequest {
    pub wallet_address: String,
    pub amount: Decimal,
}

#[derive(Debug, serde::Deserialize)]
pub struct InstallCapabilityRequest {
    pub capability: Capability,
    /// Hex-encoded PKCS#8 session key material
    pub session_key_pkcs8: String,
}

#[derive(Debug, serde::Serialize)]
pub struct BalancesResponse {
    pub wallet_address: Address,
    pub stable: Decimal,
    pub gold: Decimal,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
