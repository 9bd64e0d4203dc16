use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::store::SharedConfigStore;
use crate::config::OrchestratorConfig;
use crate::events::EventBus;
use crate::job::types::{JobHandle, JobSummary};
use crate::job::JobRunner;

/// Bookkeeping for the single job the façade allows running at a time (`POST /scrape`
/// `409` guard).
pub struct RunningJob {
    pub handle: Arc<JobHandle>,
    pub started_at: DateTime<Utc>,
    pub started_instant: Instant,
    pub total_skus: usize,
    pub site_names: Vec<String>,
}

/// Shared state for the `axum` router: the job runner, the event bus, the config store, and
/// the at-most-one running-job slot.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<JobRunner>,
    pub event_bus: Arc<EventBus>,
    pub config_store: SharedConfigStore,
    pub config: OrchestratorConfig,
    pub running: Arc<Mutex<Option<RunningJob>>>,
    pub last_summary: Arc<Mutex<Option<JobSummary>>>,
}

impl AppState {
    pub fn new(
        runner: Arc<JobRunner>,
        event_bus: Arc<EventBus>,
        config_store: SharedConfigStore,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runner,
            event_bus,
            config_store,
            config,
            running: Arc::new(Mutex::new(None)),
            last_summary: Arc::new(Mutex::new(None)),
        }
    }
}
