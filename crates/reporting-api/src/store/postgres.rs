use async_trait::async_trait;
use mlm_network::{
    AffiliateId, ExternalId, Financials, LevelStats, NetworkEntry, NetworkError, NetworkResult,
    NetworkStats, NetworkStore, PostgresNetworkStore, SyncRun, MAX_SUPPORTED_LEVELS,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::{
    ranked, AffiliateRow, GlobalStats, RankingOrder, RankingRow, ReportingStore, StoredStats,
};

fn storage_err(err: sqlx::Error) -> NetworkError {
    NetworkError::Storage(err.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `s.level_1_{field} + .. + s.level_5_{field}`.
fn level_sum(field: &str) -> String {
    (1..=MAX_SUPPORTED_LEVELS)
        .map(|level| format!("s.level_{level}_{field}"))
        .collect::<Vec<_>>()
        .join(" + ")
}

/// `%term%` with LIKE wildcards in `term` matched literally (`ESCAPE '\'`).
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const AFFILIATE_SELECT: &str = "SELECT a.id, a.external_id, a.name, a.total_clients, \
     COALESCE(s.total_network, 0) AS total_network, \
     COALESCE(s.level_1_count, 0) AS level_1_count, s.last_calculated \
     FROM affiliates a LEFT JOIN mlm_stats s ON s.affiliate_id = a.id";

fn affiliate_from_row(row: &PgRow) -> NetworkResult<AffiliateRow> {
    Ok(AffiliateRow {
        id: row.try_get("id").map_err(storage_err)?,
        external_id: row.try_get("external_id").map_err(storage_err)?,
        name: row.try_get("name").map_err(storage_err)?,
        total_clients: row.try_get("total_clients").map_err(storage_err)?,
        total_network: row.try_get("total_network").map_err(storage_err)?,
        level_1_count: row.try_get("level_1_count").map_err(storage_err)?,
        last_calculated: row.try_get("last_calculated").map_err(storage_err)?,
    })
}

fn stats_from_row(row: &PgRow) -> NetworkResult<StoredStats> {
    let money = |level: u8, field: &str| -> Result<Decimal, sqlx::Error> {
        row.try_get(format!("level_{level}_{field}").as_str())
    };

    let mut levels = Vec::with_capacity(MAX_SUPPORTED_LEVELS as usize);
    for level in 1..=MAX_SUPPORTED_LEVELS {
        let count: i64 = row
            .try_get(format!("level_{level}_count").as_str())
            .map_err(storage_err)?;
        levels.push(LevelStats {
            level,
            count: u64::try_from(count).unwrap_or(0),
            financials: Financials {
                deposits: money(level, "deposits").map_err(storage_err)?,
                bets: money(level, "bets").map_err(storage_err)?,
                ggr: money(level, "ggr").map_err(storage_err)?,
                cpa: money(level, "cpa").map_err(storage_err)?,
                rev: money(level, "rev").map_err(storage_err)?,
            },
        });
    }
    let total: i64 = row.try_get("total_network").map_err(storage_err)?;

    Ok(StoredStats {
        stats: NetworkStats {
            total_network_size: u64::try_from(total).unwrap_or(0),
            levels,
        },
        last_calculated: row.try_get("last_calculated").map_err(storage_err)?,
    })
}

fn entry_from_row(row: &PgRow) -> NetworkResult<NetworkEntry> {
    let level: i16 = row.try_get("level").map_err(storage_err)?;
    let path: Vec<String> = row.try_get("path").map_err(storage_err)?;
    Ok(NetworkEntry {
        client_id: ExternalId::from(row.try_get::<String, _>("client_id").map_err(storage_err)?),
        level: u8::try_from(level)
            .map_err(|_| NetworkError::Storage(format!("level {level} out of range")))?,
        path: path.into_iter().map(ExternalId::from).collect(),
        direct_sponsor: ExternalId::from(
            row.try_get::<String, _>("direct_sponsor")
                .map_err(storage_err)?,
        ),
        financials: Financials {
            deposits: row.try_get("deposits").map_err(storage_err)?,
            bets: row.try_get("bets").map_err(storage_err)?,
            ggr: row.try_get("ggr").map_err(storage_err)?,
            cpa: row.try_get("cpa").map_err(storage_err)?,
            rev: row.try_get("rev").map_err(storage_err)?,
        },
    })
}

#[async_trait]
impl ReportingStore for PostgresNetworkStore {
    async fn ping(&self) -> NetworkResult<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_affiliates(
        &self,
        search: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> NetworkResult<(Vec<AffiliateRow>, u64)> {
        const FILTER: &str = "WHERE a.external_id IS NOT NULL AND ($1::text IS NULL \
             OR a.external_id ILIKE $1 ESCAPE '\\' OR a.name ILIKE $1 ESCAPE '\\' \
             OR a.email ILIKE $1 ESCAPE '\\')";
        let pattern = search.map(like_pattern);

        let rows = sqlx::query(&format!(
            "{AFFILIATE_SELECT} {FILTER} \
             ORDER BY total_network DESC, a.external_id LIMIT $2 OFFSET $3"
        ))
        .bind(pattern.as_deref())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM affiliates a {FILTER}"))
            .bind(pattern.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(storage_err)?;

        let affiliates = rows
            .iter()
            .map(affiliate_from_row)
            .collect::<NetworkResult<Vec<_>>>()?;
        Ok((affiliates, u64::try_from(total).unwrap_or(0)))
    }

    async fn affiliate(&self, external_id: &str) -> NetworkResult<Option<AffiliateRow>> {
        let row = sqlx::query(&format!("{AFFILIATE_SELECT} WHERE a.external_id = $1"))
            .bind(external_id)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;
        row.as_ref().map(affiliate_from_row).transpose()
    }

    async fn network_stats(&self, affiliate: AffiliateId) -> NetworkResult<Option<StoredStats>> {
        let row = sqlx::query("SELECT * FROM mlm_stats WHERE affiliate_id = $1")
            .bind(affiliate.0)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;
        row.as_ref().map(stats_from_row).transpose()
    }

    async fn network_entries(
        &self,
        affiliate: AffiliateId,
        level: Option<u8>,
        offset: u64,
        limit: u64,
    ) -> NetworkResult<(Vec<NetworkEntry>, u64)> {
        let level = level.map(i16::from);

        let rows = sqlx::query(
            "SELECT client_id, level, path, direct_sponsor, deposits, bets, ggr, cpa, rev \
             FROM mlm_network \
             WHERE affiliate_id = $1 AND ($2::smallint IS NULL OR level = $2) \
             ORDER BY level, id LIMIT $3 OFFSET $4",
        )
        .bind(affiliate.0)
        .bind(level)
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mlm_network \
             WHERE affiliate_id = $1 AND ($2::smallint IS NULL OR level = $2)",
        )
        .bind(affiliate.0)
        .bind(level)
        .fetch_one(self.pool())
        .await
        .map_err(storage_err)?;

        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<NetworkResult<Vec<_>>>()?;
        Ok((entries, u64::try_from(total).unwrap_or(0)))
    }

    async fn ranking(&self, order: RankingOrder, limit: u64) -> NetworkResult<Vec<RankingRow>> {
        let order_by = match order {
            RankingOrder::Network => "total_network DESC",
            RankingOrder::Clients => "total_clients DESC",
        };
        let rows = sqlx::query(&format!(
            "SELECT external_id, name, total_clients, total_network, level_1_count, \
             network_deposits FROM v_affiliate_ranking \
             ORDER BY {order_by}, external_id LIMIT $1"
        ))
        .bind(to_i64(limit))
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;

        let mut ranking = Vec::with_capacity(rows.len());
        for row in &rows {
            ranking.push(RankingRow {
                rank: 0,
                external_id: row.try_get("external_id").map_err(storage_err)?,
                name: row.try_get("name").map_err(storage_err)?,
                total_clients: row.try_get("total_clients").map_err(storage_err)?,
                total_network: row.try_get("total_network").map_err(storage_err)?,
                level_1_count: row.try_get("level_1_count").map_err(storage_err)?,
                network_deposits: row.try_get("network_deposits").map_err(storage_err)?,
            });
        }
        Ok(ranked(ranking))
    }

    async fn global_stats(&self) -> NetworkResult<GlobalStats> {
        let sql = format!(
            "SELECT COUNT(*) AS total_affiliates, \
             COUNT(s.affiliate_id) FILTER (WHERE s.total_network > 0) AS affiliates_with_network, \
             COALESCE(SUM(a.total_clients), 0)::BIGINT AS total_clients, \
             COALESCE(SUM(s.total_network), 0)::BIGINT AS total_network, \
             COALESCE(SUM({}), 0) AS network_deposits, \
             COALESCE(SUM({}), 0) AS network_cpa, \
             COALESCE(SUM({}), 0) AS network_rev, \
             MAX(s.last_calculated) AS last_calculated \
             FROM affiliates a LEFT JOIN mlm_stats s ON s.affiliate_id = a.id \
             WHERE a.external_id IS NOT NULL",
            level_sum("deposits"),
            level_sum("cpa"),
            level_sum("rev"),
        );
        let row = sqlx::query(&sql)
            .fetch_one(self.pool())
            .await
            .map_err(storage_err)?;

        Ok(GlobalStats {
            total_affiliates: row.try_get("total_affiliates").map_err(storage_err)?,
            affiliates_with_network: row.try_get("affiliates_with_network").map_err(storage_err)?,
            total_clients: row.try_get("total_clients").map_err(storage_err)?,
            total_network: row.try_get("total_network").map_err(storage_err)?,
            network_deposits: row.try_get("network_deposits").map_err(storage_err)?,
            network_cpa: row.try_get("network_cpa").map_err(storage_err)?,
            network_rev: row.try_get("network_rev").map_err(storage_err)?,
            last_calculated: row.try_get("last_calculated").map_err(storage_err)?,
        })
    }

    async fn sync_runs(&self) -> NetworkResult<Vec<SyncRun>> {
        NetworkStore::list_sync_runs(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ab"), "%ab%");
        assert_eq!(like_pattern("_"), "%\\_%");
        assert_eq!(like_pattern("10%"), "%10\\%%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_level_sum_covers_every_level() {
        let sql = level_sum("cpa");
        assert_eq!(
            sql,
            "s.level_1_cpa + s.level_2_cpa + s.level_3_cpa + s.level_4_cpa + s.level_5_cpa"
        );
    }
}
