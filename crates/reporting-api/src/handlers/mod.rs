//! Route handlers.

pub mod affiliates;
pub mod health;
pub mod metrics;
pub mod reports;
pub mod sync;

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;

use crate::error::{ApiError, ApiResult};

/// Unwrap query parameters, turning malformed input into a 400 envelope.
pub(crate) fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}
