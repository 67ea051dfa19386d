//! # Jobs
//!
//! The four sync jobs, how they were triggered, and how they ended.

use std::fmt;
use std::str::FromStr;

use mlm_network::SyncType;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// A sync job the scheduler can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Refresh the affiliate roster from the source.
    #[serde(rename = "affiliates_sync")]
    RosterSync,
    /// Clear and rebuild every network.
    #[serde(rename = "mlm_network_sync")]
    NetworkRebuild,
    /// Rebuild networks whose referrals changed since the watermark.
    #[serde(rename = "incremental_sync")]
    IncrementalSync,
    /// Purge expired cache rows.
    #[serde(rename = "cache_cleanup")]
    CacheCleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::RosterSync,
        JobKind::NetworkRebuild,
        JobKind::IncrementalSync,
        JobKind::CacheCleanup,
    ];

    /// Key used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RosterSync => "affiliates_sync",
            JobKind::NetworkRebuild => "mlm_network_sync",
            JobKind::IncrementalSync => "incremental_sync",
            JobKind::CacheCleanup => "cache_cleanup",
        }
    }

    /// Whether the job takes the single-flight slot.
    pub fn is_guarded(&self) -> bool {
        !matches!(self, JobKind::CacheCleanup)
    }

    /// Sync-run key written for this job, if it keeps one.
    pub fn sync_type(&self, trigger: Trigger) -> Option<SyncType> {
        match self {
            JobKind::RosterSync => Some(trigger.roster_sync_type()),
            JobKind::NetworkRebuild => Some(SyncType::MlmNetwork),
            JobKind::IncrementalSync => Some(SyncType::Incremental),
            JobKind::CacheCleanup => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| SchedulerError::UnknownJob(s.to_string()))
    }
}

/// What started a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    /// Roster runs keep separate sync records for cron and manual triggers.
    pub fn roster_sync_type(self) -> SyncType {
        match self {
            Trigger::Scheduled => SyncType::AutoAffiliates,
            Trigger::Manual => SyncType::Affiliates,
        }
    }
}

/// How a triggered job ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { processed: u64, failed: u64, total: u64 },
    /// Another guarded job held the slot; nothing ran.
    Skipped { running: JobKind },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_key_depends_on_trigger() {
        assert_eq!(
            JobKind::RosterSync.sync_type(Trigger::Scheduled),
            Some(SyncType::AutoAffiliates)
        );
        assert_eq!(
            JobKind::RosterSync.sync_type(Trigger::Manual),
            Some(SyncType::Affiliates)
        );
        assert_eq!(JobKind::CacheCleanup.sync_type(Trigger::Manual), None);
    }

    #[test]
    fn test_only_cleanup_is_unguarded() {
        let unguarded: Vec<JobKind> = JobKind::ALL
            .into_iter()
            .filter(|job| !job.is_guarded())
            .collect();
        assert_eq!(unguarded, vec![JobKind::CacheCleanup]);
    }

    #[test]
    fn test_parse_job_keys() {
        assert_eq!("mlm_network_sync".parse::<JobKind>().unwrap(), JobKind::NetworkRebuild);
        assert!("auto_affiliates_sync".parse::<JobKind>().is_err());
    }
}
