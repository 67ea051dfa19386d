//! Prometheus metrics for the affiliate network service.
//!
//! All metrics follow the naming convention: `affiliate_<area>_<metric>_<unit>`
//!
//! The `job` label carries the sync job key (`mlm_network_sync`,
//! `affiliates_sync`, `incremental_sync`, `cache_cleanup`).

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts,
    HistogramVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SYNC JOBS
    // =========================================================================

    /// Finished sync jobs by outcome
    pub static ref SYNC_RUNS: CounterVec = CounterVec::new(
        Opts::new("affiliate_sync_runs_total", "Sync jobs finished, by job and outcome"),
        &["job", "outcome"]  // outcome: completed/failed
    ).expect("metric creation failed");

    /// Triggers dropped because another guarded job was running
    pub static ref SYNC_SKIPPED: CounterVec = CounterVec::new(
        Opts::new("affiliate_sync_skipped_total", "Sync triggers skipped while another job ran"),
        &["job"]
    ).expect("metric creation failed");

    /// Sync job duration
    pub static ref SYNC_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("affiliate_sync_duration_seconds", "Time spent running sync jobs")
            .buckets(exponential_buckets(0.05, 2.0, 16).expect("valid buckets")),
        &["job"]
    ).expect("metric creation failed");

    /// Unix time of the last successful run
    pub static ref SYNC_LAST_SUCCESS: GaugeVec = GaugeVec::new(
        Opts::new("affiliate_sync_last_success_timestamp_seconds", "Unix time of the last successful run"),
        &["job"]
    ).expect("metric creation failed");

    /// 1 while a guarded job holds the scheduler
    pub static ref SCHEDULER_BUSY: Gauge = Gauge::new(
        "affiliate_scheduler_busy",
        "Whether a guarded sync job is running"
    ).expect("metric creation failed");

    // =========================================================================
    // NETWORK BUILDER
    // =========================================================================

    /// Affiliates whose network was rebuilt
    pub static ref AFFILIATES_PROCESSED: CounterVec = CounterVec::new(
        Opts::new("affiliate_network_affiliates_processed_total", "Affiliates rebuilt successfully"),
        &["job"]
    ).expect("metric creation failed");

    /// Affiliates whose rebuild failed and was skipped
    pub static ref AFFILIATES_FAILED: CounterVec = CounterVec::new(
        Opts::new("affiliate_network_affiliates_failed_total", "Affiliates whose rebuild failed"),
        &["job"]
    ).expect("metric creation failed");

    /// Network entries written to the reporting store
    pub static ref NETWORK_ENTRIES_WRITTEN: Counter = Counter::new(
        "affiliate_network_entries_written_total",
        "Network entries written to the reporting store"
    ).expect("metric creation failed");

    /// Expired cache rows removed by cleanup
    pub static ref CACHE_ROWS_REMOVED: Counter = Counter::new(
        "affiliate_cache_rows_removed_total",
        "Expired cache rows removed by cleanup"
    ).expect("metric creation failed");

    // =========================================================================
    // REPORTING API
    // =========================================================================

    /// HTTP requests served
    pub static ref HTTP_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("affiliate_http_requests_total", "HTTP requests served, by route and status"),
        &["route", "status"]
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the global registry.
///
/// Calling it more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Sync jobs
        Box::new(SYNC_RUNS.clone()),
        Box::new(SYNC_SKIPPED.clone()),
        Box::new(SYNC_DURATION.clone()),
        Box::new(SYNC_LAST_SUCCESS.clone()),
        Box::new(SCHEDULER_BUSY.clone()),
        // Network builder
        Box::new(AFFILIATES_PROCESSED.clone()),
        Box::new(AFFILIATES_FAILED.clone()),
        Box::new(NETWORK_ENTRIES_WRITTEN.clone()),
        Box::new(CACHE_ROWS_REMOVED.clone()),
        // Reporting API
        Box::new(HTTP_REQUESTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard observing a labelled histogram on drop.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for `histogram` with `labels`.
    pub fn new(histogram: &HistogramVec, labels: &[&str]) -> Self {
        Self {
            histogram: histogram.with_label_values(labels),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_counter_increment() {
        SYNC_RUNS.with_label_values(&["mlm_network_sync", "completed"]).inc();
        assert!(
            SYNC_RUNS
                .with_label_values(&["mlm_network_sync", "completed"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_encode_contains_registered_metric() {
        register_metrics().unwrap();
        NETWORK_ENTRIES_WRITTEN.inc_by(3.0);

        let text = encode_metrics().unwrap();
        assert!(text.contains("affiliate_network_entries_written_total"));
    }

    #[test]
    fn test_histogram_timer() {
        {
            let _timer = HistogramTimer::new(&SYNC_DURATION, &["cache_cleanup"]);
        }
        assert!(SYNC_DURATION.with_label_values(&["cache_cleanup"]).get_sample_count() >= 1);
    }
}
