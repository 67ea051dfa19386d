//! # Service Container
//!
//! Owns every long-lived component and wires them together.
//!
//! ```text
//! external pool ─► PostgresReferralSource ─┐
//!                                          ├─► NetworkBuilderService ─► SyncScheduler
//! reporting pool ─► PostgresNetworkStore ──┘                               │
//!                          │                                               │
//!                          └──────────────► AppState (reporting API) ◄─────┘
//! ```
//!
//! The builder and the API share the reporting pool.

use std::sync::Arc;

use mlm_network::{
    NetworkBuilderApi, NetworkBuilderService, NetworkError, NetworkStore, PostgresNetworkStore,
    PostgresReferralSource, ReferralSource,
};
use reporting_api::{AppState, ReportingStore};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sync_scheduler::{SchedulerError, SyncScheduler};
use thiserror::Error;
use tracing::{info, instrument};

use crate::container::config::{DatabaseConfig, ExternalDbConfig, NodeConfig};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to connect to {pool} database: {source}")]
    Connect {
        pool: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Every component the node runs.
pub struct ServiceContainer {
    pub reporting_pool: PgPool,
    pub external_pool: PgPool,
    pub store: Arc<PostgresNetworkStore>,
    pub builder: Arc<NetworkBuilderService>,
    pub scheduler: Arc<SyncScheduler>,
}

impl ServiceContainer {
    /// Open both pools and build the component graph.
    #[instrument(skip_all)]
    pub async fn connect(config: &NodeConfig) -> Result<Self, ContainerError> {
        let reporting_pool = reporting_pool(&config.database).await?;
        let external_pool = external_pool(&config.external).await?;
        info!(
            external_host = %config.external.host,
            external_ssl = config.external.ssl,
            "Database pools ready"
        );

        let store = Arc::new(PostgresNetworkStore::new(reporting_pool.clone()));
        let source = Arc::new(PostgresReferralSource::new(
            external_pool.clone(),
            &config.network.source,
        )?);
        let builder = Arc::new(NetworkBuilderService::new(
            config.network.clone(),
            source as Arc<dyn ReferralSource>,
            Arc::clone(&store) as Arc<dyn NetworkStore>,
        )?);
        let scheduler = Arc::new(SyncScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&builder) as Arc<dyn NetworkBuilderApi>,
        )?);

        Ok(Self {
            reporting_pool,
            external_pool,
            store,
            builder,
            scheduler,
        })
    }

    /// Handler state for the reporting API.
    pub fn app_state(&self, service_name: &str) -> AppState {
        AppState::new(Arc::clone(&self.store) as Arc<dyn ReportingStore>, service_name)
            .with_scheduler(Arc::clone(&self.scheduler))
    }

    /// Wait for in-flight queries, then close both pools.
    pub async fn close(&self) {
        self.reporting_pool.close().await;
        self.external_pool.close().await;
    }
}

async fn reporting_pool(config: &DatabaseConfig) -> Result<PgPool, ContainerError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|source| ContainerError::Connect {
            pool: "reporting",
            source,
        })
}

/// Connection options for the operator database.
pub fn external_options(config: &ExternalDbConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .ssl_mode(if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        });
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    options
}

async fn external_pool(config: &ExternalDbConfig) -> Result<PgPool, ContainerError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(external_options(config))
        .await
        .map_err(|source| ContainerError::Connect {
            pool: "external",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_options_follow_config() {
        let config = ExternalDbConfig {
            host: "operator.internal".to_string(),
            port: 6432,
            user: Some("reader".to_string()),
            database: "casino".to_string(),
            ssl: true,
            ..ExternalDbConfig::default()
        };

        let options = external_options(&config);

        assert_eq!(options.get_host(), "operator.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "reader");
        assert_eq!(options.get_database(), Some("casino"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));
    }

    #[test]
    fn test_external_ssl_off_prefers_tls() {
        let options = external_options(&ExternalDbConfig::default());

        assert_eq!(options.get_port(), 5999);
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Prefer));
    }
}
