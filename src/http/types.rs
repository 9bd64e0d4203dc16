//! Wire DTOs for the job-control HTTP surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::JobRequest;
use crate::events::types::{EventType, ScraperEvent, Severity};

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub skus: Vec<String>,
    pub scrapers: Vec<String>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub debug_mode: bool,
}

impl From<ScrapeRequest> for JobRequest {
    fn from(req: ScrapeRequest) -> Self {
        let mut job = JobRequest::new(req.skus, req.scrapers);
        job.max_workers = req.max_workers;
        job.test_mode = req.test_mode;
        job.debug_mode = req.debug_mode;
        job
    }
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub status: &'static str,
    pub job_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub is_running: bool,
    pub job_id: Option<String>,
    pub progress: f64,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub active_scrapers: Vec<String>,
    pub total_skus: usize,
    pub completed_skus: usize,
    pub eta_seconds: Option<f64>,
    pub workers: HashMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub job_id: Option<String>,
    pub event_types: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<ScraperEvent>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct EventTypesResponse {
    pub event_types: Vec<&'static str>,
    pub categories: HashMap<&'static str, Vec<&'static str>>,
}

impl EventTypesResponse {
    pub fn build() -> Self {
        let mut categories: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
        for event_type in EventType::all() {
            categories.entry(event_type.category()).or_default().push(event_type.as_str());
        }
        Self {
            event_types: EventType::all().iter().map(|e| e.as_str()).collect(),
            categories,
        }
    }
}

/// Informational severities surfaced as "logs" in `GET /status`, as opposed to `errors`.
pub fn is_log_severity(severity: Severity) -> bool {
    matches!(severity, Severity::Debug | Severity::Info)
}
