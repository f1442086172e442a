//! Back-office routes. Mounted behind [`crate::auth::require_admin`].

use ashva_core::{WithdrawalRecord, WithdrawalStatus};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct WithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub tx_hash: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub activated: u64,
}

pub async fn list_withdrawals(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<WithdrawalQuery>,
) -> ApiResult<Json<Vec<WithdrawalRecord>>> {
    Ok(Json(state.engine().list_withdrawals(query.status).await?))
}

pub async fn approve_withdrawal(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ApproveRequest>,
) -> ApiResult<Json<WithdrawalRecord>> {
    let record = state
        .engine()
        .approve_withdrawal(id, &request.tx_hash)
        .await?;
    info!("Admin approved withdrawal {}", id);
    Ok(Json(record))
}

/// The body is optional; a request without one uses the default reason, but
/// a JSON body that does not parse is a 400.
pub async fn reject_withdrawal(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> ApiResult<Json<WithdrawalRecord>> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => RejectRequest::default(),
        Err(rejection) => return Err(ApiError::from(rejection)),
    };
    let record = state
        .engine()
        .reject_withdrawal(id, request.reason.as_deref())
        .await?;
    info!("Admin rejected withdrawal {}", id);
    Ok(Json(record))
}

pub async fn sweep_nodes(State(state): State<SharedState>) -> ApiResult<Json<SweepResponse>> {
    let activated = state.engine().sweep_deployments(Utc::now()).await?;
    Ok(Json(SweepResponse { activated }))
}
