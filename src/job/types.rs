//! Job-level types: request handling, status, and summary (contract).

use std::collections::HashMap;

use crate::config::JobRequest;
use crate::results::record::HealthStatus;
use crate::retry::executor::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct JobCounters {
    pub total: usize,
    pub successful: usize,
    pub no_results: usize,
    pub not_found: usize,
    pub failed: usize,
}

/// Snapshot of a job's progress, returned by `GET /status`.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub counters: JobCounters,
    /// Populated only when the job ran in test mode.
    pub site_health: HashMap<String, HealthStatus>,
    pub session_path: Option<String>,
}

/// A running job's control handle: lets callers observe status and request cancellation
/// without holding a reference to the runner internals (`POST /stop`).
pub struct JobHandle {
    pub job_id: String,
    pub request: JobRequest,
    pub cancellation: CancellationToken,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, request: JobRequest) -> Self {
        Self {
            job_id: job_id.into(),
            request,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn stop(&self) {
        self.cancellation.cancel();
    }
}
