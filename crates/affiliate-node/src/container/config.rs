//! # Node Configuration
//!
//! Unified configuration for the stores, the network builder, the scheduler
//! and the reporting API, read from environment variables.
//!
//! `DATABASE_URL` is the only required variable; everything else has a
//! default. Invalid values abort startup rather than falling back.

use std::str::FromStr;
use std::time::Duration;

use mlm_network::{NetworkConfig, NetworkError, SourceSchema};
use sync_scheduler::{JobKind, SchedulerConfig, SchedulerError};
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Reporting store (read/write).
    pub database: DatabaseConfig,
    /// Operator database holding referral edges (read-only).
    pub external: ExternalDbConfig,
    pub network: NetworkConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ExternalDbConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    /// Require TLS to the operator database.
    pub ssl: bool,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for ExternalDbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5999,
            user: None,
            password: None,
            database: "postgres".to_string(),
            ssl: false,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub service_name: String,
    /// Jobs triggered once, in order, right after startup.
    pub startup_jobs: Vec<JobKind>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            service_name: "affiliate-service".to_string(),
            startup_jobs: Vec::new(),
        }
    }
}

/// Typed access to a variable source.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value of `var`, ignoring blank strings.
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(ConfigError::Invalid {
                var,
                value,
                reason: "expected true or false".to_string(),
            }),
        }
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }
}

impl NodeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let database = DatabaseConfig {
            url: vars.get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            max_connections: vars.parse("DATABASE_POOL_MAX", 10)?,
            min_connections: vars.parse("DATABASE_POOL_MIN", 2)?,
            acquire_timeout: Duration::from_secs(vars.parse("DATABASE_ACQUIRE_TIMEOUT_SECS", 30)?),
        };

        let external_defaults = ExternalDbConfig::default();
        let external = ExternalDbConfig {
            host: vars.string("EXTERNAL_DB_HOST", &external_defaults.host),
            port: vars.parse("EXTERNAL_DB_PORT", external_defaults.port)?,
            user: vars.get("EXTERNAL_DB_USER"),
            password: vars.get("EXTERNAL_DB_PASSWORD"),
            database: vars.string("EXTERNAL_DB_NAME", &external_defaults.database),
            ssl: vars.flag("EXTERNAL_DB_SSL", external_defaults.ssl)?,
            max_connections: vars.parse("EXTERNAL_DB_POOL_MAX", external_defaults.max_connections)?,
            acquire_timeout: Duration::from_secs(vars.parse(
                "EXTERNAL_DB_ACQUIRE_TIMEOUT_SECS",
                external_defaults.acquire_timeout.as_secs(),
            )?),
        };

        let network_defaults = NetworkConfig::default();
        let network = NetworkConfig {
            max_levels: vars.parse("MLM_MAX_LEVELS", network_defaults.max_levels)?,
            progress_every: network_defaults.progress_every,
            source: SourceSchema {
                edges_table: vars.string(
                    "EXTERNAL_EDGES_TABLE",
                    &network_defaults.source.edges_table,
                ),
                edge_type_column: vars.string(
                    "EXTERNAL_EDGE_TYPE_COLUMN",
                    &network_defaults.source.edge_type_column,
                ),
                updated_at_column: vars.get("EXTERNAL_UPDATED_AT_COLUMN"),
                sponsor_id_type: vars.get("EXTERNAL_SPONSOR_ID_TYPE"),
            },
        };

        let scheduler_defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            enabled: vars.flag("SYNC_SCHEDULER_ENABLED", scheduler_defaults.enabled)?,
            roster_cron: vars.string("SYNC_CRON_AFFILIATES", &scheduler_defaults.roster_cron),
            rebuild_cron: vars.string("SYNC_CRON_MLM", &scheduler_defaults.rebuild_cron),
            incremental_cron: vars.string(
                "SYNC_CRON_INCREMENTAL",
                &scheduler_defaults.incremental_cron,
            ),
            cleanup_cron: vars.string("SYNC_CRON_CACHE_CLEANUP", &scheduler_defaults.cleanup_cron),
        };

        let api_defaults = ApiConfig::default();
        let startup_jobs = match vars.get("SYNC_RUN_ON_STARTUP") {
            None => Vec::new(),
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(JobKind::from_str)
                .collect::<Result<Vec<_>, _>>()?,
        };
        let api = ApiConfig {
            port: vars.parse("PORT", api_defaults.port)?,
            service_name: vars.string("SERVICE_NAME", &api_defaults.service_name),
            startup_jobs,
        };

        let config = Self {
            database,
            external,
            network,
            scheduler,
            api,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks plus each component's own validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DATABASE_POOL_MAX",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DATABASE_POOL_MIN",
                value: self.database.min_connections.to_string(),
                reason: format!("exceeds DATABASE_POOL_MAX ({})", self.database.max_connections),
            });
        }
        if self.external.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "EXTERNAL_DB_POOL_MAX",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.network.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}
