//! # Scheduler Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron engine refused a job or failed to start/stop.
    #[error("Cron scheduler error: {0}")]
    Cron(String),

    #[error("Invalid cron expression for {job}: '{expression}'")]
    InvalidCron { job: String, expression: String },

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Scheduler already started")]
    AlreadyStarted,
}
