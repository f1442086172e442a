use ashva_core::{Address, CommissionRecord, DownlineEntry, Node, Wallet, WithdrawalRecord};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::ApiResult;
use crate::state::SharedState;

// Request models
#[derive(Debug, Deserialize)]
pub struct ConnectWalletRequest {
    pub address: String,
    pub balance: Decimal,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncWalletRequest {
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    pub referrer: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub depth: Option<usize>,
}

// Response models
#[derive(Debug, Serialize)]
pub struct AncestorsResponse {
    pub address: Address,
    pub ancestors: Vec<Address>,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub address: Address,
    pub size: usize,
    pub members: Vec<DownlineEntry>,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/connect", post(connect_wallet))
        .route("/:address", get(get_wallet))
        .route("/:address/sync", post(sync_wallet))
        .route("/:address/referral", post(attach_referral))
        .route("/:address/ancestors", get(ancestors))
        .route("/:address/team", get(team))
        .route("/:address/commissions", get(commissions))
        .route("/:address/withdrawals", get(withdrawals))
        .route("/:address/nodes", get(nodes))
}

async fn connect_wallet(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<ConnectWalletRequest>,
) -> ApiResult<Json<Wallet>> {
    let wallet = state
        .engine()
        .connect_wallet(&request.address, request.balance, request.referrer.as_deref())
        .await?;
    Ok(Json(wallet))
}

async fn get_wallet(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(state.engine().wallet(&address).await?))
}

async fn sync_wallet(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
    ApiJson(request): ApiJson<SyncWalletRequest>,
) -> ApiResult<Json<Wallet>> {
    let address = Address::parse(&address)?;
    let wallet = state.engine().sync_wallet(&address, request.balance).await?;
    Ok(Json(wallet))
}

async fn attach_referral(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
    ApiJson(request): ApiJson<ReferralRequest>,
) -> ApiResult<Json<Wallet>> {
    let wallet = state
        .engine()
        .attach_referral(&address, &request.referrer)
        .await?;
    Ok(Json(wallet))
}

async fn ancestors(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<AncestorsResponse>> {
    let engine = state.engine();
    let wallet = engine.wallet(&address).await?;
    let ancestors = engine
        .ancestors(wallet.address.as_str(), engine.config().max_referral_depth)
        .await?;

    Ok(Json(AncestorsResponse {
        address: wallet.address,
        ancestors,
    }))
}

async fn team(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
    ApiQuery(query): ApiQuery<TeamQuery>,
) -> ApiResult<Json<TeamResponse>> {
    let engine = state.engine();
    let wallet = engine.wallet(&address).await?;
    let depth = query.depth.unwrap_or(engine.config().max_referral_depth);
    let members = engine.downline(wallet.address.as_str(), depth).await?;

    Ok(Json(TeamResponse {
        address: wallet.address,
        size: members.len(),
        members,
    }))
}

async fn commissions(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Vec<CommissionRecord>>> {
    Ok(Json(state.engine().commissions_for(&address).await?))
}

async fn withdrawals(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Vec<WithdrawalRecord>>> {
    Ok(Json(state.engine().withdrawals_for(&address).await?))
}

async fn nodes(
    State(state): State<SharedState>,
    ApiPath(address): ApiPath<String>,
) -> ApiResult<Json<Vec<Node>>> {
    Ok(Json(state.engine().nodes_for(&address).await?))
}
