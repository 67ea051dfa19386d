//! # PostgreSQL Network Store
//!
//! Reporting-store adapter. Every multi-statement write runs inside one
//! transaction; an early return drops the transaction and rolls it back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, warn};

use crate::domain::{
    Affiliate, AffiliateId, ExternalId, Financials, NetworkError, NetworkForest, NetworkResult,
    NetworkStats, RosterEntry, SyncLogEntry, SyncRun, SyncRunRecord, SyncStatus, SyncType,
    MAX_SUPPORTED_LEVELS,
};
use crate::ports::NetworkStore;

fn storage_err(err: sqlx::Error) -> NetworkError {
    NetworkError::Storage(err.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Apply embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> NetworkResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| NetworkError::Storage(format!("migration failed: {e}")))
}

/// `INSERT .. ON CONFLICT` for `mlm_stats`, one count and five money
/// columns per level.
fn stats_upsert_sql() -> String {
    const MONEY: [&str; 5] = ["deposits", "bets", "ggr", "cpa", "rev"];

    let mut columns = vec!["affiliate_id".to_string(), "total_network".to_string()];
    for level in 1..=MAX_SUPPORTED_LEVELS {
        columns.push(format!("level_{level}_count"));
        for field in MONEY {
            columns.push(format!("level_{level}_{field}"));
        }
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    format!(
        "INSERT INTO mlm_stats ({}, last_calculated) VALUES ({}, ${}) \
         ON CONFLICT (affiliate_id) DO UPDATE SET {}, last_calculated = EXCLUDED.last_calculated",
        columns.join(", "),
        placeholders.join(", "),
        columns.len() + 1,
        updates.join(", ")
    )
}

fn affiliate_from_row(row: &PgRow) -> NetworkResult<Affiliate> {
    Ok(Affiliate {
        id: AffiliateId(row.try_get("id").map_err(storage_err)?),
        external_id: ExternalId::from(row.try_get::<String, _>("external_id").map_err(storage_err)?),
        total_clients: row.try_get("total_clients").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    })
}

fn sync_run_from_row(sync_type: SyncType, row: &PgRow) -> NetworkResult<SyncRun> {
    let status: String = row.try_get("status").map_err(storage_err)?;
    Ok(SyncRun::restore(
        sync_type,
        SyncRunRecord {
            status: Some(status.parse::<SyncStatus>()?),
            started_at: row.try_get("started_at").map_err(storage_err)?,
            completed_at: row.try_get("completed_at").map_err(storage_err)?,
            last_sync: row.try_get("last_sync").map_err(storage_err)?,
            records_processed: to_u64(row.try_get("records_processed").map_err(storage_err)?),
            total_records: to_u64(row.try_get("total_records").map_err(storage_err)?),
            error_message: row.try_get("error_message").map_err(storage_err)?,
        },
    ))
}

const SYNC_RUN_COLUMNS: &str = "sync_type, status, started_at, completed_at, last_sync, \
                                records_processed, total_records, error_message";

/// Network store over a `sqlx` Postgres pool.
pub struct PostgresNetworkStore {
    pool: PgPool,
    stats_sql: String,
}

impl PostgresNetworkStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            stats_sql: stats_upsert_sql(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NetworkStore for PostgresNetworkStore {
    async fn list_affiliates(&self) -> NetworkResult<Vec<Affiliate>> {
        let rows = sqlx::query(
            "SELECT id, external_id, total_clients, updated_at FROM affiliates \
             WHERE external_id IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(affiliate_from_row).collect()
    }

    async fn find_affiliate(&self, external_id: &ExternalId) -> NetworkResult<Option<Affiliate>> {
        let row = sqlx::query(
            "SELECT id, external_id, total_clients, updated_at FROM affiliates \
             WHERE external_id = $1",
        )
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.as_ref().map(affiliate_from_row).transpose()
    }

    async fn upsert_affiliates(
        &self,
        roster: &[RosterEntry],
        now: DateTime<Utc>,
    ) -> NetworkResult<u64> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for row in roster {
            sqlx::query(
                "INSERT INTO affiliates (external_id, total_clients, updated_at) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (external_id) DO UPDATE \
                 SET total_clients = EXCLUDED.total_clients, updated_at = EXCLUDED.updated_at",
            )
            .bind(row.external_id.as_str())
            .bind(row.total_clients)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(roster.len() as u64)
    }

    async fn client_financials(
        &self,
        clients: &[ExternalId],
    ) -> NetworkResult<HashMap<ExternalId, Financials>> {
        if clients.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = clients.iter().map(|c| c.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT client_id, deposits, bets, ggr, cpa, rev FROM client_financials \
             WHERE client_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let client: String = row.try_get("client_id").map_err(storage_err)?;
                let money = |column: &str| row.try_get::<Decimal, _>(column).map_err(storage_err);
                Ok((
                    ExternalId::from(client),
                    Financials {
                        deposits: money("deposits")?,
                        bets: money("bets")?,
                        ggr: money("ggr")?,
                        cpa: money("cpa")?,
                        rev: money("rev")?,
                    },
                ))
            })
            .collect()
    }

    async fn replace_network(
        &self,
        affiliate: AffiliateId,
        forest: &NetworkForest,
        stats: &NetworkStats,
        now: DateTime<Utc>,
    ) -> NetworkResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query("DELETE FROM mlm_network WHERE affiliate_id = $1")
            .bind(affiliate.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        for entry in forest.entries() {
            let path: Vec<&str> = entry.path.iter().map(ExternalId::as_str).collect();
            sqlx::query(
                "INSERT INTO mlm_network \
                 (affiliate_id, client_id, level, path, direct_sponsor, deposits, bets, ggr, cpa, rev) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(affiliate.0)
            .bind(entry.client_id.as_str())
            .bind(i16::from(entry.level))
            .bind(&path)
            .bind(entry.direct_sponsor.as_str())
            .bind(entry.financials.deposits)
            .bind(entry.financials.bets)
            .bind(entry.financials.ggr)
            .bind(entry.financials.cpa)
            .bind(entry.financials.rev)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        let mut query = sqlx::query(&self.stats_sql)
            .bind(affiliate.0)
            .bind(to_i64(stats.total_network_size));
        for level in 1..=MAX_SUPPORTED_LEVELS {
            let money = stats.financials_at(level);
            query = query
                .bind(to_i64(stats.count_at(level)))
                .bind(money.deposits)
                .bind(money.bets)
                .bind(money.ggr)
                .bind(money.cpa)
                .bind(money.rev);
        }
        query
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        debug!(affiliate = %affiliate, entries = forest.len(), "Network replaced");
        Ok(())
    }

    async fn clear_all_networks(&self) -> NetworkResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        sqlx::query("DELETE FROM mlm_network")
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM mlm_stats")
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)
    }

    async fn load_sync_run(&self, sync_type: SyncType) -> NetworkResult<SyncRun> {
        let row = sqlx::query(&format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_control WHERE sync_type = $1"
        ))
        .bind(sync_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        match row {
            Some(row) => sync_run_from_row(sync_type, &row),
            None => Ok(SyncRun::pending(sync_type)),
        }
    }

    async fn save_sync_run(&self, run: &SyncRun) -> NetworkResult<()> {
        sqlx::query(&format!(
            "INSERT INTO sync_control ({SYNC_RUN_COLUMNS}, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) \
             ON CONFLICT (sync_type) DO UPDATE SET \
             status = EXCLUDED.status, started_at = EXCLUDED.started_at, \
             completed_at = EXCLUDED.completed_at, last_sync = EXCLUDED.last_sync, \
             records_processed = EXCLUDED.records_processed, \
             total_records = EXCLUDED.total_records, \
             error_message = EXCLUDED.error_message, updated_at = NOW()"
        ))
        .bind(run.sync_type().as_str())
        .bind(run.status().as_str())
        .bind(run.started_at())
        .bind(run.completed_at())
        .bind(run.last_sync())
        .bind(to_i64(run.records_processed()))
        .bind(to_i64(run.total_records()))
        .bind(run.error_message())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn list_sync_runs(&self) -> NetworkResult<Vec<SyncRun>> {
        let rows = sqlx::query(&format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_control ORDER BY sync_type"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row.try_get("sync_type").map_err(storage_err)?;
            match key.parse::<SyncType>() {
                Ok(sync_type) => runs.push(sync_run_from_row(sync_type, row)?),
                Err(_) => warn!(sync_type = %key, "Ignoring unknown sync_control row"),
            }
        }
        Ok(runs)
    }

    async fn purge_expired_cache(&self, now: DateTime<Utc>) -> NetworkResult<u64> {
        let result = sqlx::query("DELETE FROM affiliate_cache_metadata WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> NetworkResult<()> {
        sqlx::query(
            "INSERT INTO sync_logs (sync_type, level, message, details) VALUES ($1, $2, $3, $4)",
        )
        .bind(&entry.sync_type)
        .bind(&entry.level)
        .bind(&entry.message)
        .bind(&entry.details)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
