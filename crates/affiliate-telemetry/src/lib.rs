//! # Affiliate Telemetry
//!
//! Logging and metrics for the affiliate network service.
//!
//! ## Components
//!
//! - **Logs**: `tracing` subscriber with env filter, JSON in containers
//! - **Metrics**: Prometheus registry, scraped from the reporting API's
//!   `/metrics` route
//!
//! ## Usage
//!
//! ```rust,ignore
//! use affiliate_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SERVICE_NAME` | `affiliate-service` | Service name in startup logs |
//! | `AFFILIATE_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honoured) |
//! | `AFFILIATE_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `AFFILIATE_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, AFFILIATES_FAILED,
    AFFILIATES_PROCESSED, CACHE_ROWS_REMOVED, HTTP_REQUESTS, NETWORK_ENTRIES_WRITTEN,
    SCHEDULER_BUSY, SYNC_DURATION, SYNC_LAST_SUCCESS, SYNC_RUNS, SYNC_SKIPPED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    tracing_setup::init_tracing(config)?;

    Ok(TelemetryGuard { _metrics: metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "affiliate-service");
    }
}
