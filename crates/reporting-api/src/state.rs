//! Shared handler state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sync_scheduler::SyncScheduler;

use crate::store::ReportingStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReportingStore>,
    pub scheduler: Option<Arc<SyncScheduler>>,
    pub service_name: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReportingStore>, service_name: impl Into<String>) -> Self {
        Self {
            store,
            scheduler: None,
            service_name: service_name.into(),
            started_at: Utc::now(),
        }
    }

    /// Attach the scheduler whose state `/api/v1/sync/status` reports.
    pub fn with_scheduler(mut self, scheduler: Arc<SyncScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}
