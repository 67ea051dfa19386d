use axum::{http::header, response::IntoResponse};

use crate::error::{ApiError, ApiResult};

/// Prometheus text exposition.
pub async fn metrics() -> ApiResult<impl IntoResponse> {
    let body = affiliate_telemetry::encode_metrics()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
