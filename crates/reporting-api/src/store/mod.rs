//! # Reporting Store
//!
//! Read-only queries behind the HTTP routes. Implemented directly on the
//! network builder's stores so the API and the builder share one pool.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlm_network::{AffiliateId, NetworkEntry, NetworkResult, NetworkStats, SyncRun};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One affiliate as listed by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffiliateRow {
    pub id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub total_clients: i64,
    pub total_network: i64,
    pub level_1_count: i64,
    pub last_calculated: Option<DateTime<Utc>>,
}

/// Persisted stats plus the time they were computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredStats {
    pub stats: NetworkStats,
    pub last_calculated: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingOrder {
    #[default]
    Network,
    Clients,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankingRow {
    pub rank: u32,
    pub external_id: String,
    pub name: Option<String>,
    pub total_clients: i64,
    pub total_network: i64,
    pub level_1_count: i64,
    pub network_deposits: Decimal,
}

/// Totals across every affiliate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub total_affiliates: i64,
    pub affiliates_with_network: i64,
    pub total_clients: i64,
    pub total_network: i64,
    pub network_deposits: Decimal,
    pub network_cpa: Decimal,
    pub network_rev: Decimal,
    pub last_calculated: Option<DateTime<Utc>>,
}

/// Read side of the reporting store.
#[async_trait]
pub trait ReportingStore: Send + Sync {
    /// Cheap reachability check for `/health`.
    async fn ping(&self) -> NetworkResult<()>;

    /// Page of affiliates, largest networks first, and the filtered total.
    async fn list_affiliates(
        &self,
        search: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> NetworkResult<(Vec<AffiliateRow>, u64)>;

    async fn affiliate(&self, external_id: &str) -> NetworkResult<Option<AffiliateRow>>;

    async fn network_stats(&self, affiliate: AffiliateId) -> NetworkResult<Option<StoredStats>>;

    /// Page of persisted entries ordered by level, optionally one level only.
    async fn network_entries(
        &self,
        affiliate: AffiliateId,
        level: Option<u8>,
        offset: u64,
        limit: u64,
    ) -> NetworkResult<(Vec<NetworkEntry>, u64)>;

    async fn ranking(&self, order: RankingOrder, limit: u64) -> NetworkResult<Vec<RankingRow>>;

    async fn global_stats(&self) -> NetworkResult<GlobalStats>;

    async fn sync_runs(&self) -> NetworkResult<Vec<SyncRun>>;
}

/// Ranking positions start at 1.
pub(crate) fn ranked<I>(rows: I) -> Vec<RankingRow>
where
    I: IntoIterator<Item = RankingRow>,
{
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| RankingRow {
            rank: i as u32 + 1,
            ..row
        })
        .collect()
}
