//! # Sync Runs
//!
//! One `SyncRun` per sync-type key, overwritten in place on every run.
//!
//! ```text
//! Pending ──start──→ Running ──complete──→ Completed
//!                       │                      │
//!                       └──fail──→ Error       │
//!                                    │         │
//!                      start (fresh started_at)┘
//! ```
//!
//! `Running -> Running` is rejected. A row left `Running` by a process that
//! died mid-run is closed with [`SyncRun::abandon`] before the next start.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::NetworkError;

/// Sync-type keys, as stored in `sync_control.sync_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncType {
    /// Full network rebuild.
    #[serde(rename = "mlm_network_sync")]
    MlmNetwork,
    /// Scheduled roster sync.
    #[serde(rename = "auto_affiliates_sync")]
    AutoAffiliates,
    /// Manually triggered roster sync.
    #[serde(rename = "affiliates_sync")]
    Affiliates,
    /// Watermark-driven partial rebuild.
    #[serde(rename = "incremental_sync")]
    Incremental,
}

impl SyncType {
    pub const ALL: [SyncType; 4] = [
        SyncType::MlmNetwork,
        SyncType::AutoAffiliates,
        SyncType::Affiliates,
        SyncType::Incremental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::MlmNetwork => "mlm_network_sync",
            SyncType::AutoAffiliates => "auto_affiliates_sync",
            SyncType::Affiliates => "affiliates_sync",
            SyncType::Incremental => "incremental_sync",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| NetworkError::Storage(format!("unknown sync type '{s}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "error" => Ok(SyncStatus::Error),
            other => Err(NetworkError::Storage(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Progress record of one sync job.
///
/// Fields are private; state changes go through the transition methods.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    sync_type: SyncType,
    status: SyncStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_sync: Option<DateTime<Utc>>,
    records_processed: u64,
    total_records: u64,
    error_message: Option<String>,
}

/// Stored columns of a sync run, used to rehydrate a [`SyncRun`].
#[derive(Clone, Debug, Default)]
pub struct SyncRunRecord {
    pub status: Option<SyncStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub total_records: u64,
    pub error_message: Option<String>,
}

impl SyncRun {
    /// A run that has never started.
    pub fn pending(sync_type: SyncType) -> Self {
        Self {
            sync_type,
            status: SyncStatus::Pending,
            started_at: None,
            completed_at: None,
            last_sync: None,
            records_processed: 0,
            total_records: 0,
            error_message: None,
        }
    }

    /// Rebuild a run from its stored columns.
    pub fn restore(sync_type: SyncType, record: SyncRunRecord) -> Self {
        Self {
            sync_type,
            status: record.status.unwrap_or(SyncStatus::Pending),
            started_at: record.started_at,
            completed_at: record.completed_at,
            last_sync: record.last_sync,
            records_processed: record.records_processed,
            total_records: record.total_records,
            error_message: record.error_message,
        }
    }

    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Watermark of the last successful incremental run.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.status == SyncStatus::Running
    }

    fn reject(&self, to: SyncStatus) -> NetworkError {
        NetworkError::InvalidTransition {
            sync_type: self.sync_type,
            from: self.status,
            to,
        }
    }

    /// Enter `Running` with a fresh `started_at`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), NetworkError> {
        if self.status == SyncStatus::Running {
            return Err(self.reject(SyncStatus::Running));
        }
        self.status = SyncStatus::Running;
        self.started_at = Some(now);
        self.completed_at = None;
        self.error_message = None;
        self.records_processed = 0;
        self.total_records = 0;
        Ok(())
    }

    /// Record progress while running.
    pub fn record_progress(&mut self, processed: u64, total: u64) -> Result<(), NetworkError> {
        if self.status != SyncStatus::Running {
            return Err(self.reject(SyncStatus::Running));
        }
        self.records_processed = processed;
        self.total_records = total;
        Ok(())
    }

    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        processed: u64,
        total: u64,
    ) -> Result<(), NetworkError> {
        if self.status != SyncStatus::Running {
            return Err(self.reject(SyncStatus::Completed));
        }
        self.status = SyncStatus::Completed;
        self.completed_at = Some(now);
        self.records_processed = processed;
        self.total_records = total;
        Ok(())
    }

    /// Complete and advance the watermark to this run's `started_at`.
    pub fn complete_with_watermark(
        &mut self,
        now: DateTime<Utc>,
        processed: u64,
        total: u64,
    ) -> Result<(), NetworkError> {
        let watermark = self.started_at;
        self.complete(now, processed, total)?;
        self.last_sync = watermark;
        Ok(())
    }

    pub fn fail(&mut self, now: DateTime<Utc>, message: impl Into<String>) -> Result<(), NetworkError> {
        if self.status != SyncStatus::Running {
            return Err(self.reject(SyncStatus::Error));
        }
        self.status = SyncStatus::Error;
        self.completed_at = Some(now);
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Close a run left `Running` by a process that never finished it.
    ///
    /// Returns `false` when the run was not running.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != SyncStatus::Running {
            return false;
        }
        self.status = SyncStatus::Error;
        self.completed_at = Some(now);
        self.error_message = Some("interrupted before completion".to_string());
        true
    }
}

/// Append-only operational log row (`sync_logs`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Free-form job key; not limited to [`SyncType`] keys.
    pub sync_type: String,
    pub level: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl SyncLogEntry {
    pub fn info(sync_type: &str, message: &str, details: serde_json::Value) -> Self {
        Self {
            sync_type: sync_type.to_string(),
            level: "info".to_string(),
            message: message.to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_pending_to_completed() {
        let mut run = SyncRun::pending(SyncType::MlmNetwork);
        run.start(at(10)).unwrap();
        assert!(run.is_running());

        run.complete(at(20), 2, 3).unwrap();
        assert_eq!(run.status(), SyncStatus::Completed);
        assert_eq!(run.records_processed(), 2);
        assert_eq!(run.total_records(), 3);
        assert_eq!(run.completed_at(), Some(at(20)));
    }

    #[test]
    fn test_running_to_running_rejected() {
        let mut run = SyncRun::pending(SyncType::MlmNetwork);
        run.start(at(10)).unwrap();

        let err = run.start(at(11)).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::InvalidTransition {
                from: SyncStatus::Running,
                to: SyncStatus::Running,
                ..
            }
        ));
        assert_eq!(run.started_at(), Some(at(10)));
    }

    #[test]
    fn test_restart_from_error_clears_message() {
        let mut run = SyncRun::pending(SyncType::Incremental);
        run.start(at(1)).unwrap();
        run.fail(at(2), "boom").unwrap();
        assert_eq!(run.error_message(), Some("boom"));

        run.start(at(3)).unwrap();
        assert_eq!(run.error_message(), None);
        assert_eq!(run.started_at(), Some(at(3)));
        assert_eq!(run.completed_at(), None);
    }

    #[test]
    fn test_complete_requires_running() {
        let mut run = SyncRun::pending(SyncType::MlmNetwork);
        assert!(run.complete(at(1), 0, 0).is_err());
        assert!(run.fail(at(1), "x").is_err());
    }

    #[test]
    fn test_watermark_is_started_at() {
        let mut run = SyncRun::pending(SyncType::Incremental);
        run.start(at(100)).unwrap();
        run.complete_with_watermark(at(200), 1, 1).unwrap();
        assert_eq!(run.last_sync(), Some(at(100)));
    }

    #[test]
    fn test_abandon_only_touches_running() {
        let mut run = SyncRun::pending(SyncType::MlmNetwork);
        assert!(!run.abandon(at(1)));

        run.start(at(1)).unwrap();
        assert!(run.abandon(at(2)));
        assert_eq!(run.status(), SyncStatus::Error);
        run.start(at(3)).unwrap();
    }

    #[test]
    fn test_sync_type_keys_round_trip() {
        for t in SyncType::ALL {
            assert_eq!(t.as_str().parse::<SyncType>().unwrap(), t);
        }
        assert!("nope".parse::<SyncType>().is_err());
    }
}
