use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status of the service: "ok" or "degraded"
    pub status: String,

    /// Database connection status, `None` on the in-memory store
    pub database_connection: Option<bool>,

    /// API version
    pub version: String,
}

/// Check the health of the API and its database
pub async fn check_health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let database_connection = match state.db_pool() {
        Some(pool) => Some(sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()),
        None => None,
    };

    let healthy = database_connection != Some(false);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            database_connection,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
