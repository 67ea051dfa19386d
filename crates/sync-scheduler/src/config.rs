//! # Scheduler Configuration
//!
//! Cron expressions use six fields, seconds first, evaluated in UTC.

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::jobs::JobKind;

/// Every 30 minutes.
pub const DEFAULT_ROSTER_CRON: &str = "0 */30 * * * *";
/// Every 6 hours.
pub const DEFAULT_REBUILD_CRON: &str = "0 0 */6 * * *";
/// Hourly.
pub const DEFAULT_INCREMENTAL_CRON: &str = "0 0 * * * *";
/// Daily at 02:00.
pub const DEFAULT_CLEANUP_CRON: &str = "0 0 2 * * *";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false, `start` registers nothing; manual triggers still work.
    pub enabled: bool,
    pub roster_cron: String,
    pub rebuild_cron: String,
    pub incremental_cron: String,
    pub cleanup_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            roster_cron: DEFAULT_ROSTER_CRON.to_string(),
            rebuild_cron: DEFAULT_REBUILD_CRON.to_string(),
            incremental_cron: DEFAULT_INCREMENTAL_CRON.to_string(),
            cleanup_cron: DEFAULT_CLEANUP_CRON.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Create a config for testing (cron disabled).
    pub fn for_testing() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Cron expression for `job`.
    pub fn cron_for(&self, job: JobKind) -> &str {
        match job {
            JobKind::RosterSync => &self.roster_cron,
            JobKind::NetworkRebuild => &self.rebuild_cron,
            JobKind::IncrementalSync => &self.incremental_cron,
            JobKind::CacheCleanup => &self.cleanup_cron,
        }
    }

    /// Shape check: six fields (seconds first) or seven (with year).
    ///
    /// Field syntax is checked by the cron engine when jobs are registered.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for job in JobKind::ALL {
            let expression = self.cron_for(job);
            let fields = expression.split_whitespace().count();
            if !(6..=7).contains(&fields) {
                return Err(SchedulerError::InvalidCron {
                    job: job.to_string(),
                    expression: expression.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.cron_for(JobKind::NetworkRebuild), "0 0 */6 * * *");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_five_field_cron_rejected() {
        let config = SchedulerConfig {
            roster_cron: "*/30 * * * *".to_string(),
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidCron { job, .. }) if job == "affiliates_sync"
        ));
    }
}
