//! # PostgreSQL Referral Source
//!
//! Read-only queries against the external transactional database.
//!
//! User ids are returned as text so integer and string keyed deployments
//! behave the same. The sponsor lookup casts its parameter to
//! `SourceSchema::sponsor_id_type` when configured, keeping the column bare
//! for index use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::debug;

use crate::config::SourceSchema;
use crate::domain::{ExternalId, NetworkError, NetworkResult, RosterEntry};
use crate::ports::{ChangedSponsors, ReferralSource};

fn source_err(err: sqlx::Error) -> NetworkError {
    NetworkError::Source(err.to_string())
}

/// Referral source over a `sqlx` Postgres pool.
pub struct PostgresReferralSource {
    pool: PgPool,
    children_sql: String,
    roster_sql: String,
    sponsors_sql: String,
    changed_sql: Option<String>,
}

impl PostgresReferralSource {
    /// Build the query set for `schema`; identifiers are validated first.
    pub fn new(pool: PgPool, schema: &SourceSchema) -> NetworkResult<Self> {
        schema.validate()?;
        let table = &schema.edges_table;
        let kind = &schema.edge_type_column;

        let children_sql = children_sql(schema);
        let roster_sql = format!(
            "SELECT user_afil::text AS external_id, COUNT(DISTINCT user_id) AS total_clients \
             FROM {table} \
             WHERE user_afil IS NOT NULL AND user_id IS NOT NULL AND {kind} = 1 \
             GROUP BY user_afil \
             HAVING COUNT(DISTINCT user_id) > 0 \
             ORDER BY user_afil"
        );
        let sponsors_sql = format!(
            "SELECT DISTINCT user_afil::text AS sponsor FROM {table} \
             WHERE user_afil IS NOT NULL AND user_id IS NOT NULL AND {kind} = 1 \
             ORDER BY 1"
        );
        let changed_sql = schema.updated_at_column.as_ref().map(|updated| {
            format!(
                "SELECT DISTINCT user_afil::text AS sponsor FROM {table} \
                 WHERE user_afil IS NOT NULL AND user_id IS NOT NULL AND {kind} = 1 \
                 AND {updated} > $1 \
                 ORDER BY 1"
            )
        });

        Ok(Self {
            pool,
            children_sql,
            roster_sql,
            sponsors_sql,
            changed_sql,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn all_sponsors(&self) -> NetworkResult<Vec<ExternalId>> {
        let rows: Vec<String> = sqlx::query_scalar(&self.sponsors_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(source_err)?;
        Ok(rows.into_iter().map(ExternalId::from).collect())
    }
}

/// Direct-referral query for one sponsor, bound as `$1` text.
fn children_sql(schema: &SourceSchema) -> String {
    let table = &schema.edges_table;
    let kind = &schema.edge_type_column;
    let sponsor_match = match &schema.sponsor_id_type {
        Some(id_type) => format!("user_afil = $1::{id_type}"),
        None => "user_afil::text = $1".to_string(),
    };
    format!(
        "SELECT user_id::text AS client_id FROM {table} \
         WHERE {sponsor_match} AND user_id IS NOT NULL AND {kind} = 1 \
         ORDER BY user_id"
    )
}

#[async_trait]
impl ReferralSource for PostgresReferralSource {
    async fn direct_referrals(&self, sponsor: &ExternalId) -> NetworkResult<Vec<ExternalId>> {
        let rows: Vec<String> = sqlx::query_scalar(&self.children_sql)
            .bind(sponsor.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(source_err)?;
        Ok(rows.into_iter().map(ExternalId::from).collect())
    }

    async fn roster(&self) -> NetworkResult<Vec<RosterEntry>> {
        let rows = sqlx::query(&self.roster_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(source_err)?;

        rows.iter()
            .map(|row| {
                Ok(RosterEntry {
                    external_id: ExternalId::from(
                        row.try_get::<String, _>("external_id").map_err(source_err)?,
                    ),
                    total_clients: row.try_get("total_clients").map_err(source_err)?,
                })
            })
            .collect()
    }

    async fn changed_sponsors(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> NetworkResult<ChangedSponsors> {
        let (Some(sql), Some(since)) = (&self.changed_sql, since) else {
            return Ok(ChangedSponsors {
                sponsors: self.all_sponsors().await?,
                filtered: self.changed_sql.is_some(),
            });
        };

        let rows: Vec<String> = sqlx::query_scalar(sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(source_err)?;
        debug!(since = %since, sponsors = rows.len(), "Fetched changed sponsors");

        Ok(ChangedSponsors {
            sponsors: rows.into_iter().map(ExternalId::from).collect(),
            filtered: true,
        })
    }
}
