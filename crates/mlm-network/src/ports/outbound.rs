//! # Outbound Ports
//!
//! Traits for the two databases the builder talks to: the external source it
//! reads referral edges from, and the reporting store it writes networks to.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Affiliate, AffiliateId, ExternalId, Financials, NetworkForest, NetworkResult, NetworkStats,
    RosterEntry, SyncLogEntry, SyncRun, SyncType,
};

/// Sponsors whose referrals may have changed since a watermark.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangedSponsors {
    pub sponsors: Vec<ExternalId>,
    /// `false` when the source cannot filter by update time and returned
    /// every sponsor.
    pub filtered: bool,
}

/// External source reader - outbound port.
///
/// Read-only. Ids are compared in textual form.
#[async_trait]
pub trait ReferralSource: Send + Sync {
    /// Direct referrals of `sponsor`, in a stable order.
    async fn direct_referrals(&self, sponsor: &ExternalId) -> NetworkResult<Vec<ExternalId>>;

    /// Every sponsor with at least one referral, with its distinct client count.
    async fn roster(&self) -> NetworkResult<Vec<RosterEntry>>;

    /// Sponsors touched after `since`, when the source can tell.
    async fn changed_sponsors(&self, since: Option<DateTime<Utc>>)
        -> NetworkResult<ChangedSponsors>;
}

/// Reporting store - outbound port.
///
/// The only writer of network, stats, and sync tables.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Affiliates with an external id, ordered by internal id.
    async fn list_affiliates(&self) -> NetworkResult<Vec<Affiliate>>;

    async fn find_affiliate(&self, external_id: &ExternalId) -> NetworkResult<Option<Affiliate>>;

    /// Insert or refresh roster rows; returns the number of rows written.
    async fn upsert_affiliates(
        &self,
        roster: &[RosterEntry],
        now: DateTime<Utc>,
    ) -> NetworkResult<u64>;

    /// Accumulated financials for `clients`; missing clients are absent.
    async fn client_financials(
        &self,
        clients: &[ExternalId],
    ) -> NetworkResult<HashMap<ExternalId, Financials>>;

    /// Atomically replace an affiliate's entries and upsert its stats row.
    ///
    /// On failure the previous entries and stats are left untouched.
    async fn replace_network(
        &self,
        affiliate: AffiliateId,
        forest: &NetworkForest,
        stats: &NetworkStats,
        now: DateTime<Utc>,
    ) -> NetworkResult<()>;

    /// Delete every network entry and stats row.
    async fn clear_all_networks(&self) -> NetworkResult<()>;

    /// Stored run for `sync_type`, or a pending one if none was saved yet.
    async fn load_sync_run(&self, sync_type: SyncType) -> NetworkResult<SyncRun>;

    /// Upsert keyed by sync type.
    async fn save_sync_run(&self, run: &SyncRun) -> NetworkResult<()>;

    async fn list_sync_runs(&self) -> NetworkResult<Vec<SyncRun>>;

    /// Delete cache metadata rows that expired before `now`.
    async fn purge_expired_cache(&self, now: DateTime<Utc>) -> NetworkResult<u64>;

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> NetworkResult<()>;
}
