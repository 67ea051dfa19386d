//! # Sync Scheduler
//!
//! Cron-driven orchestration of the network builder's background jobs.
//!
//! ## Jobs
//!
//! | Job | Key | Default cron (UTC) | Guarded |
//! |-----|-----|--------------------|---------|
//! | Roster sync | `affiliates_sync` | `0 */30 * * * *` | yes |
//! | Full rebuild | `mlm_network_sync` | `0 0 */6 * * *` | yes |
//! | Incremental sync | `incremental_sync` | `0 0 * * * *` | yes |
//! | Cache cleanup | `cache_cleanup` | `0 0 2 * * *` | no |
//!
//! ## Single-Flight Rule
//!
//! Guarded jobs share one slot. A trigger (cron or manual) that finds the
//! slot taken returns [`JobOutcome::Skipped`] immediately and writes no
//! sync-run record. Cache cleanup ignores the slot.
//!
//! ## Module Structure
//!
//! ```text
//! sync-scheduler/
//! ├── config.rs     # SchedulerConfig, cron defaults
//! ├── error.rs      # SchedulerError
//! ├── guard.rs      # SingleFlight, FlightGuard, SchedulerState
//! ├── jobs.rs       # JobKind, Trigger, JobOutcome
//! └── scheduler.rs  # JobRunner, SyncScheduler, SchedulerStatus
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod jobs;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use guard::{FlightGuard, SchedulerState, SingleFlight};
pub use jobs::{JobKind, JobOutcome, Trigger};
pub use scheduler::{JobRunner, ScheduledTask, SchedulerStatus, SyncScheduler};
