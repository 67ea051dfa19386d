use async_trait::async_trait;
use mlm_network::{
    Affiliate, AffiliateId, MemoryNetworkStore, NetworkEntry, NetworkResult, NetworkStore,
    SyncRun, MAX_SUPPORTED_LEVELS,
};
use rust_decimal::Decimal;

use super::{
    ranked, AffiliateRow, GlobalStats, RankingOrder, RankingRow, ReportingStore, StoredStats,
};

fn row_for(store: &MemoryNetworkStore, affiliate: &Affiliate) -> AffiliateRow {
    let stats = store.stats(affiliate.id);
    AffiliateRow {
        id: affiliate.id.0,
        external_id: affiliate.external_id.to_string(),
        name: None,
        total_clients: affiliate.total_clients,
        total_network: stats
            .as_ref()
            .map(|s| s.total_network_size as i64)
            .unwrap_or(0),
        level_1_count: stats.as_ref().map(|s| s.count_at(1) as i64).unwrap_or(0),
        last_calculated: None,
    }
}

fn sorted_rows(store: &MemoryNetworkStore) -> Vec<AffiliateRow> {
    let mut rows: Vec<AffiliateRow> = store
        .affiliates()
        .iter()
        .map(|a| row_for(store, a))
        .collect();
    rows.sort_by(|a, b| {
        b.total_network
            .cmp(&a.total_network)
            .then_with(|| a.external_id.cmp(&b.external_id))
    });
    rows
}

fn page<T>(items: Vec<T>, offset: u64, limit: u64) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let page = items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    (page, total)
}

#[async_trait]
impl ReportingStore for MemoryNetworkStore {
    async fn ping(&self) -> NetworkResult<()> {
        Ok(())
    }

    async fn list_affiliates(
        &self,
        search: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> NetworkResult<(Vec<AffiliateRow>, u64)> {
        let needle = search.map(str::to_lowercase);
        let rows = sorted_rows(self)
            .into_iter()
            .filter(|row| match &needle {
                Some(needle) => row.external_id.to_lowercase().contains(needle),
                None => true,
            })
            .collect();
        Ok(page(rows, offset, limit))
    }

    async fn affiliate(&self, external_id: &str) -> NetworkResult<Option<AffiliateRow>> {
        Ok(self
            .affiliates()
            .iter()
            .find(|a| a.external_id.as_str() == external_id)
            .map(|a| row_for(self, a)))
    }

    async fn network_stats(&self, affiliate: AffiliateId) -> NetworkResult<Option<StoredStats>> {
        Ok(self.stats(affiliate).map(|stats| StoredStats {
            stats,
            last_calculated: None,
        }))
    }

    async fn network_entries(
        &self,
        affiliate: AffiliateId,
        level: Option<u8>,
        offset: u64,
        limit: u64,
    ) -> NetworkResult<(Vec<NetworkEntry>, u64)> {
        let mut entries: Vec<NetworkEntry> = self
            .network(affiliate)
            .into_iter()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .collect();
        entries.sort_by_key(|e| e.level);
        Ok(page(entries, offset, limit))
    }

    async fn ranking(&self, order: RankingOrder, limit: u64) -> NetworkResult<Vec<RankingRow>> {
        let mut rows: Vec<RankingRow> = sorted_rows(self)
            .into_iter()
            .map(|row| {
                let network_deposits = self
                    .stats(AffiliateId(row.id))
                    .map(|s| {
                        (1..=MAX_SUPPORTED_LEVELS)
                            .map(|l| s.financials_at(l).deposits)
                            .sum()
                    })
                    .unwrap_or(Decimal::ZERO);
                RankingRow {
                    rank: 0,
                    external_id: row.external_id,
                    name: row.name,
                    total_clients: row.total_clients,
                    total_network: row.total_network,
                    level_1_count: row.level_1_count,
                    network_deposits,
                }
            })
            .collect();
        if order == RankingOrder::Clients {
            rows.sort_by(|a, b| {
                b.total_clients
                    .cmp(&a.total_clients)
                    .then_with(|| a.external_id.cmp(&b.external_id))
            });
        }
        rows.truncate(limit as usize);
        Ok(ranked(rows))
    }

    async fn global_stats(&self) -> NetworkResult<GlobalStats> {
        let mut totals = GlobalStats::default();
        for affiliate in self.affiliates() {
            totals.total_affiliates += 1;
            totals.total_clients += affiliate.total_clients;
            let Some(stats) = self.stats(affiliate.id) else {
                continue;
            };
            if stats.total_network_size > 0 {
                totals.affiliates_with_network += 1;
            }
            totals.total_network += stats.total_network_size as i64;
            for level in &stats.levels {
                totals.network_deposits += level.financials.deposits;
                totals.network_cpa += level.financials.cpa;
                totals.network_rev += level.financials.rev;
            }
        }
        Ok(totals)
    }

    async fn sync_runs(&self) -> NetworkResult<Vec<SyncRun>> {
        NetworkStore::list_sync_runs(self).await
    }
}
