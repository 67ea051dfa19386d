//! # Network Builder Service
//!
//! Application service running the per-affiliate pipeline
//! (traverse → enrich → aggregate → persist) and the batch jobs built on it.
//!
//! ## Failure handling
//!
//! - A failing affiliate is logged and counted; the batch moves on. This
//!   includes a failed roster lookup for one changed sponsor.
//! - A failure of the batch itself (listing affiliates, clearing networks,
//!   reading the roster) marks the run `error` and is returned.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::algorithms::{aggregate, build_network, enrich_financials};
use crate::config::NetworkConfig;
use crate::domain::{
    check_forest, invariant_stats_total, Affiliate, ExternalId, NetworkError, NetworkForest,
    NetworkResult, NetworkStats, SyncLogEntry, SyncRun, SyncType,
};
use crate::ports::{BatchReport, NetworkBuilderApi, NetworkStore, NetworkSummary, ReferralSource};

/// Sync-log key used by the cache cleanup job.
pub const CACHE_CLEANUP_LOG_KEY: &str = "cache_cleanup";

/// Counters accumulated while walking a batch.
#[derive(Debug, Default)]
struct BatchTally {
    processed: u64,
    failed: u64,
    entries: u64,
}

/// One unit of batch work.
enum BatchSlot {
    /// Already loaded from the roster.
    Known(Affiliate),
    /// A changed sponsor still to be looked up.
    Sponsor(ExternalId),
}

impl BatchSlot {
    fn external_id(&self) -> &ExternalId {
        match self {
            BatchSlot::Known(affiliate) => &affiliate.external_id,
            BatchSlot::Sponsor(external_id) => external_id,
        }
    }
}

/// Network builder - orchestrates source, algorithms and store.
pub struct NetworkBuilderService {
    config: NetworkConfig,
    source: Arc<dyn ReferralSource>,
    store: Arc<dyn NetworkStore>,
}

impl NetworkBuilderService {
    /// Create a new service; the configuration is validated first.
    pub fn new(
        config: NetworkConfig,
        source: Arc<dyn ReferralSource>,
        store: Arc<dyn NetworkStore>,
    ) -> NetworkResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            store,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn NetworkStore> {
        Arc::clone(&self.store)
    }

    /// Traverse, enrich and aggregate without persisting.
    pub async fn compute_network(
        &self,
        affiliate: &Affiliate,
    ) -> NetworkResult<(NetworkForest, NetworkStats)> {
        let mut forest = build_network(
            self.source.as_ref(),
            &affiliate.external_id,
            self.config.max_levels,
        )
        .await?;
        check_forest(&forest)?;

        if !forest.is_empty() {
            let money = self.store.client_financials(&forest.client_ids()).await?;
            enrich_financials(&mut forest, &money);
        }

        let stats = aggregate(&forest);
        if !invariant_stats_total(&stats) {
            return Err(NetworkError::InvariantViolation(format!(
                "stats total {} does not match level counts for {}",
                stats.total_network_size, affiliate.external_id
            )));
        }
        Ok((forest, stats))
    }

    /// Load the run for `sync_type`, enter `Running` and persist it.
    async fn begin_run(&self, sync_type: SyncType) -> NetworkResult<SyncRun> {
        let mut run = self.store.load_sync_run(sync_type).await?;
        let now = Utc::now();
        if run.abandon(now) {
            warn!(sync_type = %sync_type, "Previous run never finished, marking it as error");
        }
        run.start(now)?;
        self.store.save_sync_run(&run).await?;
        Ok(run)
    }

    /// Best-effort `error` transition; a failure here is only logged.
    async fn record_failure(&self, run: &mut SyncRun, err: &NetworkError) {
        error!(sync_type = %run.sync_type(), error = %err, "Sync failed");
        if let Err(e) = run.fail(Utc::now(), err.to_string()) {
            warn!(error = %e, "Could not mark sync run as failed");
            return;
        }
        if let Err(e) = self.store.save_sync_run(run).await {
            warn!(sync_type = %run.sync_type(), error = %e, "Could not persist failed sync run");
        }
    }

    async fn complete_run(
        &self,
        run: &mut SyncRun,
        tally: &BatchTally,
        total: u64,
        advance_watermark: bool,
    ) -> NetworkResult<BatchReport> {
        let now = Utc::now();
        if advance_watermark {
            run.complete_with_watermark(now, tally.processed, total)?;
        } else {
            run.complete(now, tally.processed, total)?;
        }
        self.store.save_sync_run(run).await?;

        info!(
            sync_type = %run.sync_type(),
            processed = tally.processed,
            failed = tally.failed,
            total,
            "Sync completed"
        );
        Ok(BatchReport {
            sync_type: run.sync_type(),
            processed: tally.processed,
            failed: tally.failed,
            total,
            entries_written: tally.entries,
        })
    }

    /// Resolve the affiliate behind a slot. `None` means not in the roster.
    async fn resolve(&self, slot: &BatchSlot) -> NetworkResult<Option<Affiliate>> {
        match slot {
            BatchSlot::Known(affiliate) => Ok(Some(affiliate.clone())),
            BatchSlot::Sponsor(external_id) => self.store.find_affiliate(external_id).await,
        }
    }

    /// Persist running counters; a failure here is only logged.
    async fn save_progress(&self, run: &mut SyncRun, processed: u64, total: u64) {
        if let Err(e) = run.record_progress(processed, total) {
            warn!(error = %e, "Could not record sync progress");
            return;
        }
        if let Err(e) = self.store.save_sync_run(run).await {
            warn!(sync_type = %run.sync_type(), error = %e, "Could not persist sync progress");
        }
    }

    /// Rebuild each slot in turn, isolating per-affiliate failures.
    ///
    /// A failed roster lookup counts as a failed affiliate. Sponsors missing
    /// from the roster are skipped without counting.
    async fn process_batch(&self, run: &mut SyncRun, slots: &[BatchSlot]) -> BatchTally {
        let sync_type = run.sync_type();
        let total = slots.len() as u64;
        let mut tally = BatchTally::default();

        for (index, slot) in slots.iter().enumerate() {
            match self.resolve(slot).await {
                Ok(Some(affiliate)) => match self.process_affiliate(&affiliate).await {
                    Ok(summary) => {
                        tally.processed += 1;
                        tally.entries += summary.entries as u64;
                    }
                    Err(e) => {
                        tally.failed += 1;
                        error!(
                            sync_type = %sync_type,
                            affiliate = %affiliate.external_id,
                            error = %e,
                            "Affiliate network rebuild failed"
                        );
                    }
                },
                Ok(None) => {
                    debug!(sponsor = %slot.external_id(), "Sponsor not in roster yet, skipping")
                }
                Err(e) => {
                    tally.failed += 1;
                    error!(
                        sync_type = %sync_type,
                        affiliate = %slot.external_id(),
                        error = %e,
                        "Roster lookup failed"
                    );
                }
            }

            let seen = index as u64 + 1;
            if seen % self.config.progress_every == 0 {
                info!(sync_type = %sync_type, processed = seen, total, "Batch progress");
                self.save_progress(run, tally.processed, total).await;
            }
        }
        tally
    }

    async fn rebuild_all_inner(&self, run: &mut SyncRun) -> NetworkResult<(BatchTally, u64)> {
        self.store.clear_all_networks().await?;
        let affiliates = self.store.list_affiliates().await?;
        info!(total = affiliates.len(), "Starting full network rebuild");
        let slots: Vec<BatchSlot> = affiliates.into_iter().map(BatchSlot::Known).collect();
        let tally = self.process_batch(run, &slots).await;
        Ok((tally, slots.len() as u64))
    }

    async fn incremental_inner(&self, run: &mut SyncRun) -> NetworkResult<(BatchTally, u64)> {
        let watermark = run.last_sync();
        let changed = self.source.changed_sponsors(watermark).await?;
        if !changed.filtered {
            info!("Source has no update-time column, rescanning every sponsor");
        }

        info!(
            sponsors = changed.sponsors.len(),
            since = ?watermark,
            "Starting incremental sync"
        );
        let slots: Vec<BatchSlot> = changed
            .sponsors
            .into_iter()
            .map(BatchSlot::Sponsor)
            .collect();
        let tally = self.process_batch(run, &slots).await;
        Ok((tally, slots.len() as u64))
    }

    async fn sync_roster_inner(&self) -> NetworkResult<(BatchTally, u64)> {
        let roster = self.source.roster().await?;
        let written = self.store.upsert_affiliates(&roster, Utc::now()).await?;
        Ok((
            BatchTally {
                processed: written,
                ..BatchTally::default()
            },
            roster.len() as u64,
        ))
    }
}

#[async_trait]
impl NetworkBuilderApi for NetworkBuilderService {
    async fn process_affiliate(&self, affiliate: &Affiliate) -> NetworkResult<NetworkSummary> {
        let (forest, stats) = self.compute_network(affiliate).await?;
        self.store
            .replace_network(affiliate.id, &forest, &stats, Utc::now())
            .await?;

        debug!(
            affiliate = %affiliate.external_id,
            total = stats.total_network_size,
            "Affiliate network rebuilt"
        );
        Ok(NetworkSummary {
            affiliate: affiliate.external_id.clone(),
            entries: forest.len(),
            stats,
        })
    }

    async fn rebuild_all(&self) -> NetworkResult<BatchReport> {
        let mut run = self.begin_run(SyncType::MlmNetwork).await?;
        match self.rebuild_all_inner(&mut run).await {
            Ok((tally, total)) => self.complete_run(&mut run, &tally, total, false).await,
            Err(e) => {
                self.record_failure(&mut run, &e).await;
                Err(e)
            }
        }
    }

    async fn incremental_sync(&self) -> NetworkResult<BatchReport> {
        let mut run = self.begin_run(SyncType::Incremental).await?;
        match self.incremental_inner(&mut run).await {
            Ok((tally, total)) => self.complete_run(&mut run, &tally, total, true).await,
            Err(e) => {
                self.record_failure(&mut run, &e).await;
                Err(e)
            }
        }
    }

    async fn sync_roster(&self, sync_type: SyncType) -> NetworkResult<BatchReport> {
        if !matches!(sync_type, SyncType::AutoAffiliates | SyncType::Affiliates) {
            return Err(NetworkError::InvalidConfig(format!(
                "{sync_type} is not a roster sync"
            )));
        }
        let mut run = self.begin_run(sync_type).await?;
        match self.sync_roster_inner().await {
            Ok((tally, total)) => self.complete_run(&mut run, &tally, total, false).await,
            Err(e) => {
                self.record_failure(&mut run, &e).await;
                Err(e)
            }
        }
    }

    async fn cleanup_cache(&self) -> NetworkResult<u64> {
        let removed = self.store.purge_expired_cache(Utc::now()).await?;
        self.store
            .append_sync_log(&SyncLogEntry::info(
                CACHE_CLEANUP_LOG_KEY,
                "Cache cleanup completed",
                json!({ "removed_records": removed }),
            ))
            .await?;
        info!(removed, "Cache cleanup completed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryNetworkStore, MemoryReferralSource};
    use crate::domain::SyncStatus;

    fn service(
        source: &Arc<MemoryReferralSource>,
        store: &Arc<MemoryNetworkStore>,
    ) -> NetworkBuilderService {
        NetworkBuilderService::new(
            NetworkConfig::for_testing(),
            Arc::clone(source) as Arc<dyn ReferralSource>,
            Arc::clone(store) as Arc<dyn NetworkStore>,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_process_affiliate_persists_entries_and_stats() {
        let source = Arc::new(MemoryReferralSource::from_edges(&[("A", "B"), ("B", "C")]));
        let store = Arc::new(MemoryNetworkStore::new());
        let id = store.insert_affiliate("A");
        let svc = service(&source, &store);

        let affiliate = store.affiliates().remove(0);
        let summary = svc.process_affiliate(&affiliate).await.unwrap();

        assert_eq!(summary.entries, 2);
        assert_eq!(store.network(id).len(), 2);
        assert_eq!(store.stats(id).unwrap().total_network_size, 2);
    }

    #[tokio::test]
    async fn test_rebuild_clears_before_processing() {
        let source = Arc::new(MemoryReferralSource::from_edges(&[("A", "B")]));
        let store = Arc::new(MemoryNetworkStore::new());
        store.insert_affiliate("A");
        let svc = service(&source, &store);

        svc.rebuild_all().await.unwrap();
        assert_eq!(store.stats_rows(), 1);

        store.set_fail_list(true);
        let err = svc.rebuild_all().await.unwrap_err();
        assert!(matches!(err, NetworkError::Storage(_)));
        assert_eq!(store.stats_rows(), 0);

        let run = store.load_sync_run(SyncType::MlmNetwork).await.unwrap();
        assert_eq!(run.status(), SyncStatus::Error);
        assert!(run.error_message().unwrap().contains("injected list failure"));
    }

    #[tokio::test]
    async fn test_stale_running_row_is_recovered() {
        let source = Arc::new(MemoryReferralSource::default());
        let store = Arc::new(MemoryNetworkStore::new());
        let mut stale = SyncRun::pending(SyncType::MlmNetwork);
        stale.start(Utc::now()).unwrap();
        store.put_sync_run(stale);
        let svc = service(&source, &store);

        let report = svc.rebuild_all().await.unwrap();

        assert_eq!(report.total, 0);
        let run = store.load_sync_run(SyncType::MlmNetwork).await.unwrap();
        assert_eq!(run.status(), SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_incremental_lookup_failure_isolated_to_sponsor() {
        // Arrange
        let source = Arc::new(MemoryReferralSource::from_edges(&[
            ("A", "a1"),
            ("B", "b1"),
            ("C", "c1"),
        ]));
        let store = Arc::new(MemoryNetworkStore::new());
        let a = store.insert_affiliate("A");
        let b = store.insert_affiliate("B");
        let c = store.insert_affiliate("C");
        store.fail_lookup_of("B");
        let svc = service(&source, &store);

        // Act
        let report = svc.incremental_sync().await.unwrap();

        // Assert
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total, 3);
        assert_eq!(store.network(a).len(), 1);
        assert!(store.network(b).is_empty());
        assert_eq!(store.network(c).len(), 1);
        let run = store.load_sync_run(SyncType::Incremental).await.unwrap();
        assert_eq!(run.status(), SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_batch_progress_is_saved() {
        let source = Arc::new(MemoryReferralSource::from_edges(&[("A", "a1"), ("B", "b1")]));
        let store = Arc::new(MemoryNetworkStore::new());
        store.insert_affiliate("A");
        store.insert_affiliate("B");
        let svc = service(&source, &store);

        svc.rebuild_all().await.unwrap();

        // start, one progress save per affiliate, completion
        assert_eq!(store.sync_run_saves(SyncType::MlmNetwork), 4);
    }

    #[tokio::test]
    async fn test_sync_roster_upserts_affiliates() {
        let source = Arc::new(MemoryReferralSource::from_edges(&[
            ("A", "x"),
            ("A", "y"),
            ("B", "z"),
        ]));
        let store = Arc::new(MemoryNetworkStore::new());
        let svc = service(&source, &store);

        let report = svc.sync_roster(SyncType::AutoAffiliates).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.total, 2);
        let affiliates = store.affiliates();
        assert_eq!(affiliates[0].external_id.as_str(), "A");
        assert_eq!(affiliates[0].total_clients, 2);
        let run = store.load_sync_run(SyncType::AutoAffiliates).await.unwrap();
        assert_eq!(run.status(), SyncStatus::Completed);
        assert_eq!(store.sync_run_saves(SyncType::Affiliates), 0);
    }

    #[tokio::test]
    async fn test_sync_roster_rejects_other_keys() {
        let svc = service(
            &Arc::new(MemoryReferralSource::default()),
            &Arc::new(MemoryNetworkStore::new()),
        );
        assert!(matches!(
            svc.sync_roster(SyncType::MlmNetwork).await,
            Err(NetworkError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_roster_failure_marks_error() {
        let source = Arc::new(MemoryReferralSource::default());
        source.set_fail_all(true);
        let store = Arc::new(MemoryNetworkStore::new());
        let svc = service(&source, &store);

        assert!(svc.sync_roster(SyncType::Affiliates).await.is_err());
        let run = store.load_sync_run(SyncType::Affiliates).await.unwrap();
        assert_eq!(run.status(), SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_cleanup_cache_logs_removed_count() {
        let store = Arc::new(MemoryNetworkStore::new());
        store.add_cache_entry("stale", Utc::now() - chrono::Duration::hours(1));
        let svc = service(&Arc::new(MemoryReferralSource::default()), &store);

        assert_eq!(svc.cleanup_cache().await.unwrap(), 1);

        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].sync_type, CACHE_CLEANUP_LOG_KEY);
        assert_eq!(logs[0].details["removed_records"], 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NetworkConfig {
            max_levels: 0,
            ..NetworkConfig::default()
        };
        let result = NetworkBuilderService::new(
            config,
            Arc::new(MemoryReferralSource::default()),
            Arc::new(MemoryNetworkStore::new()),
        );
        assert!(result.is_err());
    }
}
