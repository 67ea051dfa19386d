//! # Sync Scheduler
//!
//! Runs the network builder's jobs on cron schedules and on demand.
//!
//! ```text
//! cron tick / manual trigger
//!         │
//!         ↓
//!   JobRunner::run ──guarded?──→ SingleFlight::try_acquire ──busy──→ Skipped
//!         │                               │
//!         │                             acquired
//!         ↓                               ↓
//!   NetworkBuilderApi::{sync_roster, rebuild_all, incremental_sync, cleanup_cache}
//! ```

use std::sync::Arc;

use affiliate_telemetry::{
    HistogramTimer, AFFILIATES_FAILED, AFFILIATES_PROCESSED, CACHE_ROWS_REMOVED,
    NETWORK_ENTRIES_WRITTEN, SYNC_DURATION, SYNC_LAST_SUCCESS, SYNC_RUNS, SYNC_SKIPPED,
};
use chrono::{DateTime, Utc};
use mlm_network::{NetworkBuilderApi, NetworkResult};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::guard::{SchedulerState, SingleFlight};
use crate::jobs::{JobKind, JobOutcome, Trigger};

/// One registered cron task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScheduledTask {
    pub job: JobKind,
    pub cron: String,
    pub guarded: bool,
}

/// Snapshot reported by `/api/v1/sync/status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub is_running: bool,
    pub current_job: Option<JobKind>,
    pub since: Option<DateTime<Utc>>,
    pub scheduled_tasks: Vec<ScheduledTask>,
}

/// Executes jobs under the single-flight rule. Shared with cron closures.
pub struct JobRunner {
    builder: Arc<dyn NetworkBuilderApi>,
    flight: Arc<SingleFlight>,
}

impl JobRunner {
    pub fn new(builder: Arc<dyn NetworkBuilderApi>) -> Self {
        Self {
            builder,
            flight: SingleFlight::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.flight.state()
    }

    /// Run `job` unless a guarded job already holds the slot.
    ///
    /// Errors are logged and folded into the outcome; nothing propagates.
    pub async fn run(&self, job: JobKind, trigger: Trigger) -> JobOutcome {
        let _guard = if job.is_guarded() {
            match self.flight.try_acquire(job) {
                Ok(guard) => Some(guard),
                Err(running) => {
                    info!(job = %job, running = %running, "Sync already in progress, skipping");
                    SYNC_SKIPPED.with_label_values(&[job.as_str()]).inc();
                    return JobOutcome::Skipped { running };
                }
            }
        } else {
            None
        };

        let sync_type = job.sync_type(trigger);
        info!(job = %job, trigger = ?trigger, sync_type = ?sync_type, "Starting sync job");
        let _timer = HistogramTimer::new(&SYNC_DURATION, &[job.as_str()]);

        match self.execute(job, trigger).await {
            Ok(outcome) => {
                SYNC_RUNS.with_label_values(&[job.as_str(), "completed"]).inc();
                SYNC_LAST_SUCCESS
                    .with_label_values(&[job.as_str()])
                    .set(Utc::now().timestamp() as f64);
                outcome
            }
            Err(e) => {
                SYNC_RUNS.with_label_values(&[job.as_str(), "failed"]).inc();
                error!(job = %job, sync_type = ?sync_type, error = %e, "Sync job failed");
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute(&self, job: JobKind, trigger: Trigger) -> NetworkResult<JobOutcome> {
        let report = match job {
            JobKind::RosterSync => {
                self.builder
                    .sync_roster(trigger.roster_sync_type())
                    .await?
            }
            JobKind::NetworkRebuild => self.builder.rebuild_all().await?,
            JobKind::IncrementalSync => self.builder.incremental_sync().await?,
            JobKind::CacheCleanup => {
                let removed = self.builder.cleanup_cache().await?;
                CACHE_ROWS_REMOVED.inc_by(removed as f64);
                return Ok(JobOutcome::Completed {
                    processed: removed,
                    failed: 0,
                    total: removed,
                });
            }
        };

        if job != JobKind::RosterSync {
            AFFILIATES_PROCESSED
                .with_label_values(&[job.as_str()])
                .inc_by(report.processed as f64);
            AFFILIATES_FAILED
                .with_label_values(&[job.as_str()])
                .inc_by(report.failed as f64);
            NETWORK_ENTRIES_WRITTEN.inc_by(report.entries_written as f64);
        }
        Ok(JobOutcome::Completed {
            processed: report.processed,
            failed: report.failed,
            total: report.total,
        })
    }
}

/// Cron-driven orchestrator around a [`JobRunner`].
pub struct SyncScheduler {
    config: SchedulerConfig,
    runner: Arc<JobRunner>,
    cron: Mutex<Option<JobScheduler>>,
}

impl SyncScheduler {
    /// Create a scheduler; the configuration is validated first.
    pub fn new(
        config: SchedulerConfig,
        builder: Arc<dyn NetworkBuilderApi>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            config,
            runner: Arc::new(JobRunner::new(builder)),
            cron: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `job` now, under the same single-flight rule as cron runs.
    pub async fn trigger(&self, job: JobKind) -> JobOutcome {
        self.runner.run(job, Trigger::Manual).await
    }

    /// Register all cron jobs and start ticking.
    ///
    /// Does nothing when the scheduler is disabled.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.config.enabled {
            info!("Sync scheduler disabled, no cron jobs registered");
            return Ok(());
        }

        let mut slot = self.cron.lock().await;
        if slot.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        let sched = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Cron(e.to_string()))?;

        for job in JobKind::ALL {
            let expression = self.config.cron_for(job);
            let runner = Arc::clone(&self.runner);
            let cron_job = Job::new_async(expression, move |_uuid, _lock| {
                let runner = Arc::clone(&runner);
                Box::pin(async move {
                    runner.run(job, Trigger::Scheduled).await;
                })
            })
            .map_err(|e| SchedulerError::InvalidCron {
                job: job.to_string(),
                expression: format!("{expression} ({e})"),
            })?;

            sched
                .add(cron_job)
                .await
                .map_err(|e| SchedulerError::Cron(e.to_string()))?;
            info!(job = %job, cron = expression, "Scheduled sync job");
        }

        sched
            .start()
            .await
            .map_err(|e| SchedulerError::Cron(e.to_string()))?;
        *slot = Some(sched);
        Ok(())
    }

    /// Stop future cron triggers. A job already running is not interrupted.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let Some(mut sched) = self.cron.lock().await.take() else {
            return Ok(());
        };
        if let SchedulerState::Running { job, .. } = self.runner.state() {
            warn!(job = %job, "Stopping scheduler while a job is still running");
        }
        sched
            .shutdown()
            .await
            .map_err(|e| SchedulerError::Cron(e.to_string()))?;
        info!("Sync scheduler stopped");
        Ok(())
    }

    pub fn status(&self) -> SchedulerStatus {
        let (current_job, since) = match self.runner.state() {
            SchedulerState::Idle => (None, None),
            SchedulerState::Running { job, since } => (Some(job), Some(since)),
        };
        let scheduled_tasks = if self.config.enabled {
            JobKind::ALL
                .into_iter()
                .map(|job| ScheduledTask {
                    job,
                    cron: self.config.cron_for(job).to_string(),
                    guarded: job.is_guarded(),
                })
                .collect()
        } else {
            Vec::new()
        };

        SchedulerStatus {
            enabled: self.config.enabled,
            is_running: current_job.is_some(),
            current_job,
            since,
            scheduled_tasks,
        }
    }
}
