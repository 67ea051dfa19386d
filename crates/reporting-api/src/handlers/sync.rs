use axum::{extract::State, Json};

use crate::dto::{ApiResponse, SyncStatusView};
use crate::error::ApiResult;
use crate::state::AppState;

/// Every stored sync run plus the live scheduler state.
pub async fn sync_status(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<SyncStatusView>>> {
    let runs = state.store.sync_runs().await?;
    let scheduler = state.scheduler.as_ref().map(|s| s.status());
    Ok(Json(ApiResponse::ok(SyncStatusView { runs, scheduler })))
}
