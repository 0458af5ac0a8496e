use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use events_common::store::StoreError;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Request-level failures. Per-event rejections are part of a successful batch response and
/// never show up here.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to parse request body: {0}")]
    RequestParsingError(String),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("invalid query parameters: {0}")]
    QueryParsingError(String),

    #[error("transient storage error, please retry")]
    StoreUnavailable(#[from] StoreError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::RequestParsingError(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::QueryParsingError(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::RequestParsingError(_) | ApiError::QueryParsingError(_) => {
                warn!("rejected request: {}", self);
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StoreUnavailable(err) => {
                error!("storage error: {}", err);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
