//! Route table and middleware stack.

use affiliate_telemetry::HTTP_REQUESTS;
use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{affiliates, health, metrics, reports, sync};
use crate::state::AppState;

/// Build the reporting router. Every route is `GET`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .route("/api/v1/affiliates", get(affiliates::list_affiliates))
        .route("/api/v1/affiliates/:id", get(affiliates::get_affiliate))
        .route("/api/v1/affiliates/:id/mlm-structure", get(affiliates::mlm_structure))
        .route("/api/v1/affiliates/:id/network", get(affiliates::network))
        .route("/api/v1/affiliates/:id/referrals", get(affiliates::network))
        .route("/api/v1/ranking", get(reports::ranking))
        .route("/api/v1/stats", get(reports::global_stats))
        .route("/api/v1/sync/status", get(sync::sync_status))
        .route_layer(middleware::from_fn(count_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Count requests per matched route template and status code.
async fn count_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    HTTP_REQUESTS
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();
    response
}
