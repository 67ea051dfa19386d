//! # In-Memory Adapters
//!
//! `ReferralSource` and `NetworkStore` backed by process memory, with
//! failure injection. Used by tests across the workspace and for local runs
//! without databases.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    Affiliate, AffiliateId, ExternalId, Financials, NetworkEntry, NetworkError, NetworkForest,
    NetworkResult, NetworkStats, RosterEntry, SyncLogEntry, SyncRun, SyncType,
};
use crate::ports::{ChangedSponsors, NetworkStore, ReferralSource};

// =============================================================================
// Referral source
// =============================================================================

#[derive(Default)]
struct SourceState {
    /// `(sponsor, client)` in insertion order.
    edges: Vec<(ExternalId, ExternalId)>,
    failing: HashSet<ExternalId>,
    fail_all: bool,
    /// Last update per sponsor; populated only when update tracking is on.
    updated: HashMap<ExternalId, DateTime<Utc>>,
    track_updates: bool,
}

/// Referral edges held in memory. Children come back in insertion order.
#[derive(Default)]
pub struct MemoryReferralSource {
    state: RwLock<SourceState>,
    queries: AtomicUsize,
}

impl MemoryReferralSource {
    pub fn from_edges(edges: &[(&str, &str)]) -> Self {
        let source = Self::default();
        for (sponsor, client) in edges {
            source.add_edge(sponsor, client);
        }
        source
    }

    pub fn add_edge(&self, sponsor: &str, client: &str) {
        self.state
            .write()
            .edges
            .push((ExternalId::from(sponsor), ExternalId::from(client)));
    }

    /// Make every query that touches `sponsor` fail.
    pub fn fail_on(&self, sponsor: &str) {
        self.state.write().failing.insert(ExternalId::from(sponsor));
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.state.write().fail_all = fail;
    }

    /// Mark `sponsor` as updated at `at` and switch on watermark filtering.
    pub fn touch(&self, sponsor: &str, at: DateTime<Utc>) {
        let mut state = self.state.write();
        state.track_updates = true;
        state.updated.insert(ExternalId::from(sponsor), at);
    }

    /// Number of `direct_referrals` calls served.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn sponsors(state: &SourceState) -> Vec<ExternalId> {
        let mut seen = HashSet::new();
        state
            .edges
            .iter()
            .filter(|(sponsor, _)| seen.insert(sponsor.clone()))
            .map(|(sponsor, _)| sponsor.clone())
            .collect()
    }
}

#[async_trait]
impl ReferralSource for MemoryReferralSource {
    async fn direct_referrals(&self, sponsor: &ExternalId) -> NetworkResult<Vec<ExternalId>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        if state.fail_all || state.failing.contains(sponsor) {
            return Err(NetworkError::Source(format!(
                "injected failure for sponsor {sponsor}"
            )));
        }
        Ok(state
            .edges
            .iter()
            .filter(|(s, _)| s == sponsor)
            .map(|(_, client)| client.clone())
            .collect())
    }

    async fn roster(&self) -> NetworkResult<Vec<RosterEntry>> {
        let state = self.state.read();
        if state.fail_all {
            return Err(NetworkError::Source("injected roster failure".to_string()));
        }
        Ok(Self::sponsors(&state)
            .into_iter()
            .map(|sponsor| {
                let clients: HashSet<&ExternalId> = state
                    .edges
                    .iter()
                    .filter(|(s, _)| *s == sponsor)
                    .map(|(_, c)| c)
                    .collect();
                RosterEntry {
                    total_clients: clients.len() as i64,
                    external_id: sponsor,
                }
            })
            .collect())
    }

    async fn changed_sponsors(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> NetworkResult<ChangedSponsors> {
        let state = self.state.read();
        if state.fail_all {
            return Err(NetworkError::Source("injected failure".to_string()));
        }
        let all = Self::sponsors(&state);
        if !state.track_updates {
            return Ok(ChangedSponsors {
                sponsors: all,
                filtered: false,
            });
        }
        let sponsors = all
            .into_iter()
            .filter(|s| match (since, state.updated.get(s)) {
                (None, _) => true,
                (Some(since), Some(at)) => *at > since,
                (Some(_), None) => false,
            })
            .collect();
        Ok(ChangedSponsors {
            sponsors,
            filtered: true,
        })
    }
}

// =============================================================================
// Network store
// =============================================================================

#[derive(Default)]
struct StoreState {
    affiliates: BTreeMap<AffiliateId, Affiliate>,
    next_id: i64,
    networks: HashMap<AffiliateId, Vec<NetworkEntry>>,
    stats: HashMap<AffiliateId, NetworkStats>,
    sync_runs: HashMap<SyncType, SyncRun>,
    sync_run_saves: HashMap<SyncType, usize>,
    financials: HashMap<ExternalId, Financials>,
    cache: Vec<(String, DateTime<Utc>)>,
    logs: Vec<SyncLogEntry>,
    /// Fail `replace_network` after writing this many entries.
    fail_after_inserts: Option<usize>,
    fail_list: bool,
    fail_clear: bool,
    failing_lookups: HashSet<ExternalId>,
}

/// Reporting store held in memory.
///
/// `replace_network` stages the new rows and swaps them in only once every
/// write succeeded, so an injected mid-write failure leaves prior rows in
/// place just as a rolled-back transaction would.
#[derive(Default)]
pub struct MemoryNetworkStore {
    state: RwLock<StoreState>,
}

impl MemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an affiliate and return its internal id.
    pub fn insert_affiliate(&self, external_id: &str) -> AffiliateId {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = AffiliateId(state.next_id);
        state.affiliates.insert(
            id,
            Affiliate {
                id,
                external_id: ExternalId::from(external_id),
                total_clients: 0,
                updated_at: None,
            },
        );
        id
    }

    pub fn affiliates(&self) -> Vec<Affiliate> {
        self.state.read().affiliates.values().cloned().collect()
    }

    pub fn network(&self, affiliate: AffiliateId) -> Vec<NetworkEntry> {
        self.state
            .read()
            .networks
            .get(&affiliate)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stats(&self, affiliate: AffiliateId) -> Option<NetworkStats> {
        self.state.read().stats.get(&affiliate).cloned()
    }

    pub fn stats_rows(&self) -> usize {
        self.state.read().stats.len()
    }

    pub fn set_financials(&self, client: &str, financials: Financials) {
        self.state
            .write()
            .financials
            .insert(ExternalId::from(client), financials);
    }

    pub fn add_cache_entry(&self, key: &str, expires_at: DateTime<Utc>) {
        self.state.write().cache.push((key.to_string(), expires_at));
    }

    pub fn cache_len(&self) -> usize {
        self.state.read().cache.len()
    }

    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.state.read().logs.clone()
    }

    /// How many times the run for `sync_type` has been saved.
    pub fn sync_run_saves(&self, sync_type: SyncType) -> usize {
        self.state
            .read()
            .sync_run_saves
            .get(&sync_type)
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite a stored run, bypassing the save counter.
    pub fn put_sync_run(&self, run: SyncRun) {
        self.state.write().sync_runs.insert(run.sync_type(), run);
    }

    pub fn fail_after_inserts(&self, inserts: Option<usize>) {
        self.state.write().fail_after_inserts = inserts;
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.write().fail_list = fail;
    }

    pub fn set_fail_clear(&self, fail: bool) {
        self.state.write().fail_clear = fail;
    }

    /// Make `find_affiliate` fail for `external_id`.
    pub fn fail_lookup_of(&self, external_id: &str) {
        self.state
            .write()
            .failing_lookups
            .insert(ExternalId::from(external_id));
    }
}

#[async_trait]
impl NetworkStore for MemoryNetworkStore {
    async fn list_affiliates(&self) -> NetworkResult<Vec<Affiliate>> {
        let state = self.state.read();
        if state.fail_list {
            return Err(NetworkError::Storage("injected list failure".to_string()));
        }
        Ok(state.affiliates.values().cloned().collect())
    }

    async fn find_affiliate(&self, external_id: &ExternalId) -> NetworkResult<Option<Affiliate>> {
        let state = self.state.read();
        if state.failing_lookups.contains(external_id) {
            return Err(NetworkError::Storage(format!(
                "injected lookup failure for {external_id}"
            )));
        }
        Ok(state
            .affiliates
            .values()
            .find(|a| &a.external_id == external_id)
            .cloned())
    }

    async fn upsert_affiliates(
        &self,
        roster: &[RosterEntry],
        now: DateTime<Utc>,
    ) -> NetworkResult<u64> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        for row in roster {
            let existing = state
                .affiliates
                .values()
                .find(|a| a.external_id == row.external_id)
                .map(|a| a.id);
            match existing.and_then(|id| state.affiliates.get_mut(&id)) {
                Some(affiliate) => {
                    affiliate.total_clients = row.total_clients;
                    affiliate.updated_at = Some(now);
                }
                None => {
                    state.next_id += 1;
                    let id = AffiliateId(state.next_id);
                    state.affiliates.insert(
                        id,
                        Affiliate {
                            id,
                            external_id: row.external_id.clone(),
                            total_clients: row.total_clients,
                            updated_at: Some(now),
                        },
                    );
                }
            }
        }
        Ok(roster.len() as u64)
    }

    async fn client_financials(
        &self,
        clients: &[ExternalId],
    ) -> NetworkResult<HashMap<ExternalId, Financials>> {
        let state = self.state.read();
        Ok(clients
            .iter()
            .filter_map(|c| state.financials.get(c).map(|f| (c.clone(), *f)))
            .collect())
    }

    async fn replace_network(
        &self,
        affiliate: AffiliateId,
        forest: &NetworkForest,
        stats: &NetworkStats,
        _now: DateTime<Utc>,
    ) -> NetworkResult<()> {
        let mut state = self.state.write();

        let mut staged = Vec::with_capacity(forest.len());
        for entry in forest.entries() {
            if state.fail_after_inserts == Some(staged.len()) {
                return Err(NetworkError::Storage(format!(
                    "injected failure after {} inserts",
                    staged.len()
                )));
            }
            staged.push(entry.clone());
        }

        state.networks.insert(affiliate, staged);
        state.stats.insert(affiliate, stats.clone());
        Ok(())
    }

    async fn clear_all_networks(&self) -> NetworkResult<()> {
        let mut state = self.state.write();
        if state.fail_clear {
            return Err(NetworkError::Storage("injected clear failure".to_string()));
        }
        state.networks.clear();
        state.stats.clear();
        Ok(())
    }

    async fn load_sync_run(&self, sync_type: SyncType) -> NetworkResult<SyncRun> {
        Ok(self
            .state
            .read()
            .sync_runs
            .get(&sync_type)
            .cloned()
            .unwrap_or_else(|| SyncRun::pending(sync_type)))
    }

    async fn save_sync_run(&self, run: &SyncRun) -> NetworkResult<()> {
        let mut state = self.state.write();
        *state.sync_run_saves.entry(run.sync_type()).or_default() += 1;
        state.sync_runs.insert(run.sync_type(), run.clone());
        Ok(())
    }

    async fn list_sync_runs(&self) -> NetworkResult<Vec<SyncRun>> {
        let state = self.state.read();
        Ok(SyncType::ALL
            .iter()
            .filter_map(|t| state.sync_runs.get(t).cloned())
            .collect())
    }

    async fn purge_expired_cache(&self, now: DateTime<Utc>) -> NetworkResult<u64> {
        let mut state = self.state.write();
        let before = state.cache.len();
        state.cache.retain(|(_, expires_at)| *expires_at >= now);
        Ok((before - state.cache.len()) as u64)
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> NetworkResult<()> {
        self.state.write().logs.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_roster_counts_distinct_clients() {
        let source = MemoryReferralSource::from_edges(&[("a", "x"), ("a", "x"), ("a", "y"), ("b", "z")]);

        let roster = source.roster().await.unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].external_id.as_str(), "a");
        assert_eq!(roster[0].total_clients, 2);
        assert_eq!(roster[1].total_clients, 1);
    }

    #[tokio::test]
    async fn test_changed_sponsors_without_tracking_returns_all() {
        let source = MemoryReferralSource::from_edges(&[("a", "x"), ("b", "y")]);

        let changed = source.changed_sponsors(Some(Utc::now())).await.unwrap();

        assert!(!changed.filtered);
        assert_eq!(changed.sponsors.len(), 2);
    }

    #[tokio::test]
    async fn test_changed_sponsors_with_tracking_filters() {
        let source = MemoryReferralSource::from_edges(&[("a", "x"), ("b", "y")]);
        let now = Utc::now();
        source.touch("a", now);
        source.touch("b", now - Duration::hours(2));

        let changed = source
            .changed_sponsors(Some(now - Duration::hours(1)))
            .await
            .unwrap();

        assert!(changed.filtered);
        assert_eq!(changed.sponsors, vec![ExternalId::from("a")]);
    }

    #[tokio::test]
    async fn test_upsert_affiliates_refreshes_existing() {
        let store = MemoryNetworkStore::new();
        let id = store.insert_affiliate("a");
        let roster = vec![
            RosterEntry {
                external_id: "a".into(),
                total_clients: 4,
            },
            RosterEntry {
                external_id: "b".into(),
                total_clients: 1,
            },
        ];

        let written = store.upsert_affiliates(&roster, Utc::now()).await.unwrap();

        assert_eq!(written, 2);
        let affiliates = store.affiliates();
        assert_eq!(affiliates.len(), 2);
        assert_eq!(affiliates[0].id, id);
        assert_eq!(affiliates[0].total_clients, 4);
    }

    #[tokio::test]
    async fn test_purge_expired_cache() {
        let store = MemoryNetworkStore::new();
        let now = Utc::now();
        store.add_cache_entry("old", now - Duration::days(1));
        store.add_cache_entry("fresh", now + Duration::days(1));

        assert_eq!(store.purge_expired_cache(now).await.unwrap(), 1);
        assert_eq!(store.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_missing_sync_run_is_pending() {
        let store = MemoryNetworkStore::new();
        let run = store.load_sync_run(SyncType::Incremental).await.unwrap();
        assert_eq!(run.status(), crate::domain::SyncStatus::Pending);
        assert_eq!(store.sync_run_saves(SyncType::Incremental), 0);
    }
}
