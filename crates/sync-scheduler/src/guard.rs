//! # Single-Flight Guard
//!
//! At most one guarded job runs at a time. A trigger that finds the slot
//! taken is dropped, not queued. The slot is released when the
//! [`FlightGuard`] drops, whichever way the job ends.
//!
//! The guard is in-process only; several service instances against one
//! reporting store need an external lock.

use std::sync::Arc;

use affiliate_telemetry::SCHEDULER_BUSY;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::jobs::JobKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running { job: JobKind, since: DateTime<Utc> },
}

/// Coordination point for guarded jobs.
#[derive(Debug)]
pub struct SingleFlight {
    state: Mutex<SchedulerState>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self {
            state: Mutex::new(SchedulerState::Idle),
        }
    }
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the slot for `job`, or report which job holds it.
    pub fn try_acquire(self: &Arc<Self>, job: JobKind) -> Result<FlightGuard, JobKind> {
        let mut state = self.state.lock();
        if let SchedulerState::Running { job: running, .. } = *state {
            return Err(running);
        }
        *state = SchedulerState::Running {
            job,
            since: Utc::now(),
        };
        SCHEDULER_BUSY.set(1.0);
        Ok(FlightGuard {
            flight: Arc::clone(self),
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state.lock().clone()
    }
}

/// Holds the single-flight slot until dropped.
#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self.flight.state.lock() = SchedulerState::Idle;
        SCHEDULER_BUSY.set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_reports_holder() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire(JobKind::NetworkRebuild).unwrap();

        assert_eq!(
            flight.try_acquire(JobKind::RosterSync).unwrap_err(),
            JobKind::NetworkRebuild
        );
        assert!(matches!(
            flight.state(),
            SchedulerState::Running {
                job: JobKind::NetworkRebuild,
                ..
            }
        ));

        drop(guard);
        assert_eq!(flight.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_released_on_panic() {
        let flight = SingleFlight::new();
        let inner = Arc::clone(&flight);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.try_acquire(JobKind::IncrementalSync).unwrap();
            panic!("job blew up");
        }));

        assert!(result.is_err());
        assert_eq!(flight.state(), SchedulerState::Idle);
        assert!(flight.try_acquire(JobKind::IncrementalSync).is_ok());
    }
}
