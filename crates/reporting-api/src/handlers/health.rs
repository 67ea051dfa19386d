use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::warn;

use crate::dto::{ApiResponse, DependencyCheck, HealthView};
use crate::state::AppState;

/// Service liveness plus reporting-store reachability. 503 when the store is down.
pub async fn health(State(state): State<AppState>) -> Response {
    let database = match state.store.ping().await {
        Ok(()) => DependencyCheck {
            status: "ok",
            message: None,
        },
        Err(e) => {
            warn!(error = %e, "Health check: reporting store unreachable");
            DependencyCheck {
                status: "error",
                message: Some(e.to_string()),
            }
        }
    };
    let healthy = database.message.is_none();

    let body = ApiResponse {
        success: healthy,
        data: HealthView {
            service: state.service_name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            database,
        },
        timestamp: Utc::now(),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
