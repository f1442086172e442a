use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::SharedState;

/// Marker inserted into request extensions once the admin token is verified
#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Constant-time comparison so token checks don't leak a matching prefix
fn tokens_match(expected: &str, supplied: &str) -> bool {
    let (a, b) = (expected.as_bytes(), supplied.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Guards the admin routes with `Authorization: Bearer <ADMIN_TOKEN>`
pub async fn require_admin(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        warn!("Admin request to {} refused: ADMIN_TOKEN is not configured", req.uri().path());
        return Err(ApiError::Unauthorized("admin access is disabled".to_string()));
    };

    match bearer_token(&req) {
        Some(token) if tokens_match(expected, token) => {
            req.extensions_mut().insert(AdminUser);
            Ok(next.run(req).await)
        }
        Some(_) => {
            warn!("Admin request to {} with invalid token", req.uri().path());
            Err(ApiError::Unauthorized("invalid admin token".to_string()))
        }
        None => Err(ApiError::Unauthorized("missing bearer token".to_string())),
    }
}
