//! API error types and the error envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use mlm_network::NetworkError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] NetworkError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{ error, message, timestamp }`
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, message) = match &self {
            ApiError::NotFound(msg) => ("Not found", msg.clone()),
            ApiError::BadRequest(msg) => ("Bad request", msg.clone()),
            ApiError::Store(e) => {
                error!(error = %e, "Reporting query failed");
                ("Internal server error", "Query failed".to_string())
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal API error");
                ("Internal server error", msg.clone())
            }
        };

        let body = ErrorBody {
            error: error.to_string(),
            message,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
