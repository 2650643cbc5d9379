use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::deposits::IngestionError;
use crate::escrow::EscrowError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// An upstream dependency (chain endpoint or store) failed.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Unavailable(String),

    /// An upstream dependency did not answer in time.
    #[error("{0}")]
    GatewayTimeout(String),

    #[error("{0}")]
    Internal(String),
}

impl From<IngestionError> for ApiError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Cancelled => ApiError::Unavailable(e.to_string()),
            IngestionError::DeadlineExceeded(_) => ApiError::GatewayTimeout(e.to_string()),
            IngestionError::Fetch(_) | IngestionError::ReadBack(_) => {
                ApiError::Upstream(e.to_string())
            }
        }
    }
}

impl From<EscrowError> for ApiError {
    fn from(e: EscrowError) -> Self {
        match e {
            EscrowError::MissingContractId | EscrowError::Json(_) => {
                ApiError::BadRequest(e.to_string())
            }
            EscrowError::NotFound(_) => ApiError::NotFound(e.to_string()),
            EscrowError::Db(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::warn!("Request failed with {}: {}", status, self);
        }

        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
