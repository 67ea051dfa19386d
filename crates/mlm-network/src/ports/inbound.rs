//! # Inbound Ports
//!
//! What the network builder offers to the scheduler and the node.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Affiliate, ExternalId, NetworkResult, NetworkStats, SyncType};

/// Result of rebuilding one affiliate's network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub affiliate: ExternalId,
    pub entries: usize,
    pub stats: NetworkStats,
}

/// Outcome of a batch job that walked many affiliates or roster rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub sync_type: SyncType,
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
    /// Network entries written across the batch.
    pub entries_written: u64,
}

/// Network builder API - inbound port.
#[async_trait]
pub trait NetworkBuilderApi: Send + Sync {
    /// Traverse, aggregate and persist one affiliate's network.
    async fn process_affiliate(&self, affiliate: &Affiliate) -> NetworkResult<NetworkSummary>;

    /// Clear every network and rebuild all affiliates (`mlm_network_sync`).
    async fn rebuild_all(&self) -> NetworkResult<BatchReport>;

    /// Rebuild affiliates whose referrals changed since the last watermark.
    async fn incremental_sync(&self) -> NetworkResult<BatchReport>;

    /// Refresh the affiliate roster from the source under `sync_type`.
    async fn sync_roster(&self, sync_type: SyncType) -> NetworkResult<BatchReport>;

    /// Purge expired cache rows; returns how many were removed.
    async fn cleanup_cache(&self) -> NetworkResult<u64>;
}
