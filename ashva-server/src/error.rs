use ashva_core::MembershipError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API Result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Membership(#[from] MembershipError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Membership(e) => match e {
                MembershipError::Validation(_) => StatusCode::BAD_REQUEST,
                MembershipError::AlreadySet(_) => StatusCode::CONFLICT,
                MembershipError::NotFound(_) => StatusCode::NOT_FOUND,
                MembershipError::InvalidState(_) => StatusCode::CONFLICT,
                MembershipError::InsufficientAmount(_)
                | MembershipError::InsufficientBalance(_) => StatusCode::UNPROCESSABLE_ENTITY,
                MembershipError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
                MembershipError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}
