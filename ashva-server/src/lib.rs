//! HTTP API and Postgres persistence for the ASHVA membership engine.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod oracle;
pub mod routes;
pub mod state;
pub mod store;
pub mod sweep;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::{admin, nodes, price, wallets, withdrawals};
use crate::state::SharedState;

pub use crate::config::AppConfig;
pub use crate::error::{ApiError, ApiResult};
pub use crate::oracle::HttpPriceOracle;
pub use crate::state::AppState;
pub use crate::store::PgWalletStore;

/// Build the application router over `state`
pub fn build_router(state: SharedState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any);

    // Admin routes (bearer token required)
    let admin_routes = Router::new()
        .route("/withdrawals", get(admin::list_withdrawals))
        .route("/withdrawals/:id/approve", post(admin::approve_withdrawal))
        .route("/withdrawals/:id/reject", post(admin::reject_withdrawal))
        .route("/nodes/sweep", post(admin::sweep_nodes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let api_routes = Router::new()
        .route("/price", get(price::current_price))
        .nest("/wallets", wallets::routes())
        .route("/nodes/purchase", post(nodes::purchase_node))
        .route("/purchases", post(nodes::record_purchase))
        .route("/withdrawals", post(withdrawals::request_withdrawal))
        .route("/withdrawals/:id", get(withdrawals::get_withdrawal))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health::check_health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
