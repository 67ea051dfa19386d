use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::dto::{ApiResponse, RankingParams};
use crate::error::ApiResult;
use crate::handlers::query_params;
use crate::state::AppState;
use crate::store::{GlobalStats, RankingRow};

/// Top affiliates by network size or direct clients.
pub async fn ranking(
    State(state): State<AppState>,
    params: Result<Query<RankingParams>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<RankingRow>>>> {
    let params = query_params(params)?;
    let limit = params.limit()?;
    let rows = state.store.ranking(params.order_by, limit).await?;
    Ok(Json(ApiResponse::ok(rows)))
}

pub async fn global_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<GlobalStats>>> {
    let stats = state.store.global_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}
