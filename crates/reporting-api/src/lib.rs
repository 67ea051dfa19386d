//! # Reporting API
//!
//! Read-only HTTP view over the networks, stats and sync runs the network
//! builder persists.
//!
//! ## Routes
//!
//! | Route | Returns |
//! |-------|---------|
//! | `GET /health` | service and store reachability (503 when the store is down) |
//! | `GET /metrics` | Prometheus text format |
//! | `GET /api/v1/affiliates?page&limit&search` | paginated affiliates with network size |
//! | `GET /api/v1/affiliates/:id` | one affiliate with per-level counts |
//! | `GET /api/v1/affiliates/:id/mlm-structure` | per-level counts and money sums |
//! | `GET /api/v1/affiliates/:id/network?page&limit&level` | persisted network entries |
//! | `GET /api/v1/affiliates/:id/referrals?page&limit&level` | same as `network` |
//! | `GET /api/v1/ranking?limit&order_by=network\|clients` | top affiliates |
//! | `GET /api/v1/stats` | totals across all affiliates |
//! | `GET /api/v1/sync/status` | stored sync runs and scheduler state |
//!
//! `:id` is the affiliate's external id. Successful responses use
//! `{ success, data, timestamp }`; failures use `{ error, message, timestamp }`.
//! `page >= 1` (default 1) and `1 <= limit <= 100` (default 20); anything
//! else is a 400.
//!
//! ## Module Structure
//!
//! ```text
//! reporting-api/
//! ├── dto.rs       # Envelopes, query parameters, response bodies
//! ├── error.rs     # ApiError -> status + error envelope
//! ├── handlers/    # One module per route group
//! ├── router.rs    # Route table, request metrics, CORS, tracing
//! ├── state.rs     # AppState
//! └── store/       # ReportingStore and its Postgres / in-memory impls
//! ```

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod store;

pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use state::AppState;
pub use store::{
    AffiliateRow, GlobalStats, RankingOrder, RankingRow, ReportingStore, StoredStats,
};
