use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub price_usd: Decimal,
}

pub async fn current_price(State(state): State<SharedState>) -> ApiResult<Json<PriceResponse>> {
    let price_usd = state.engine().current_price().await?;
    Ok(Json(PriceResponse { price_usd }))
}
