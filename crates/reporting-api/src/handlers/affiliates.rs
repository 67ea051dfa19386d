use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use mlm_network::{AffiliateId, Financials, NetworkStats, MAX_SUPPORTED_LEVELS};

use crate::dto::{
    AffiliateDetail, AffiliateList, AffiliateListParams, ApiResponse, LevelCount, MlmStructure,
    NetworkPage, NetworkParams, Pagination,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::query_params;
use crate::state::AppState;
use crate::store::{AffiliateRow, StoredStats};

async fn find_affiliate(state: &AppState, external_id: &str) -> ApiResult<AffiliateRow> {
    state
        .store
        .affiliate(external_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Affiliate {external_id} not found")))
}

/// Stored stats, or an all-zero row for affiliates never computed.
async fn stats_or_empty(state: &AppState, affiliate: &AffiliateRow) -> ApiResult<StoredStats> {
    let stored = state.store.network_stats(AffiliateId(affiliate.id)).await?;
    Ok(stored.unwrap_or_else(|| StoredStats {
        stats: NetworkStats::empty(MAX_SUPPORTED_LEVELS),
        last_calculated: None,
    }))
}

/// `GET /api/v1/affiliates`
pub async fn list_affiliates(
    State(state): State<AppState>,
    params: Result<Query<AffiliateListParams>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<AffiliateList>>> {
    let params = query_params(params)?;
    let window = params.window()?;

    let (affiliates, total) = state
        .store
        .list_affiliates(params.search(), window.offset(), window.limit)
        .await?;

    Ok(Json(ApiResponse::ok(AffiliateList {
        affiliates,
        pagination: Pagination::new(window, total),
    })))
}

/// `GET /api/v1/affiliates/:id`
pub async fn get_affiliate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<AffiliateDetail>>> {
    let affiliate = find_affiliate(&state, &id).await?;
    let stored = stats_or_empty(&state, &affiliate).await?;

    let levels = (1..=MAX_SUPPORTED_LEVELS)
        .map(|level| LevelCount {
            level,
            count: stored.stats.count_at(level),
        })
        .collect();

    Ok(Json(ApiResponse::ok(AffiliateDetail { affiliate, levels })))
}

/// `GET /api/v1/affiliates/:id/mlm-structure`
pub async fn mlm_structure(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<MlmStructure>>> {
    let affiliate = find_affiliate(&state, &id).await?;
    let StoredStats {
        stats,
        last_calculated,
    } = stats_or_empty(&state, &affiliate).await?;

    let mut totals = Financials::default();
    for level in &stats.levels {
        totals += &level.financials;
    }

    Ok(Json(ApiResponse::ok(MlmStructure {
        affiliate: affiliate.external_id,
        total_network_size: stats.total_network_size,
        levels: stats.levels,
        totals,
        last_calculated,
    })))
}

/// `GET /api/v1/affiliates/:id/network`
pub async fn network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<NetworkParams>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<NetworkPage>>> {
    let params = query_params(params)?;
    let window = params.window()?;
    let level = params.level()?;
    let affiliate = find_affiliate(&state, &id).await?;

    let (entries, total) = state
        .store
        .network_entries(AffiliateId(affiliate.id), level, window.offset(), window.limit)
        .await?;

    Ok(Json(ApiResponse::ok(NetworkPage {
        affiliate: affiliate.external_id,
        entries,
        pagination: Pagination::new(window, total),
    })))
}
