use ashva_core::{
    Address, CommissionRecord, NodePurchase, NodePurchaseOutcome, PurchaseEvent, PurchaseKind,
};
use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ApiJson;
use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub buyer: Address,
    pub amount: Decimal,
    pub source_tx: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub source_tx: String,
    pub commissions: Vec<CommissionRecord>,
}

pub async fn purchase_node(
    State(state): State<SharedState>,
    ApiJson(purchase): ApiJson<NodePurchase>,
) -> ApiResult<(StatusCode, Json<NodePurchaseOutcome>)> {
    let outcome = state.engine().purchase_node(purchase).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Pay referral commission for a purchase that provisions no node
pub async fn record_purchase(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<PurchaseRequest>,
) -> ApiResult<Json<PurchaseResponse>> {
    let event = PurchaseEvent {
        buyer: request.buyer,
        amount: request.amount,
        source_tx: request.source_tx.trim().to_string(),
        kind: PurchaseKind::Purchase,
    };

    let commissions = state.engine().distribute_commission(&event).await?;
    Ok(Json(PurchaseResponse {
        source_tx: event.source_tx,
        commissions,
    }))
}
