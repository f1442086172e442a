use ashva_core::WithdrawalRecord;
use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiJson, ApiPath};
use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub wallet: String,
    pub amount: Decimal,
}

pub async fn request_withdrawal(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<WithdrawalRequest>,
) -> ApiResult<(StatusCode, Json<WithdrawalRecord>)> {
    let record = state
        .engine()
        .request_withdrawal(&request.wallet, request.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_withdrawal(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<WithdrawalRecord>> {
    Ok(Json(state.engine().withdrawal(id).await?))
}
