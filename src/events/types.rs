//! Event envelope and the closed event-type taxonomy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity of an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// The closed event-type set, grouped by the prefixes named in the spec.
///
/// `as_str`/`category` give the wire representation (`"job.started"`) and the category
/// prefix (`"job"`) respectively, used by `GET /events/types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobStarted,
    JobCompleted,
    JobFailed,
    JobCancelled,
    ScraperStarted,
    ScraperCompleted,
    ScraperFailed,
    ScraperBrowserInit,
    ScraperBrowserRestart,
    SkuProcessing,
    SkuSuccess,
    SkuNotFound,
    SkuFailed,
    SkuNoResults,
    ProgressUpdate,
    ProgressWorker,
    SelectorFound,
    SelectorMissing,
    DataSynced,
    DataSyncFailed,
    SystemInfo,
    SystemWarning,
    SystemError,
    LoginSelectorStatus,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::JobStarted => "job.started",
            EventType::JobCompleted => "job.completed",
            EventType::JobFailed => "job.failed",
            EventType::JobCancelled => "job.cancelled",
            EventType::ScraperStarted => "scraper.started",
            EventType::ScraperCompleted => "scraper.completed",
            EventType::ScraperFailed => "scraper.failed",
            EventType::ScraperBrowserInit => "scraper.browser_init",
            EventType::ScraperBrowserRestart => "scraper.browser_restart",
            EventType::SkuProcessing => "sku.processing",
            EventType::SkuSuccess => "sku.success",
            EventType::SkuNotFound => "sku.not_found",
            EventType::SkuFailed => "sku.failed",
            EventType::SkuNoResults => "sku.no_results",
            EventType::ProgressUpdate => "progress.update",
            EventType::ProgressWorker => "progress.worker",
            EventType::SelectorFound => "selector.found",
            EventType::SelectorMissing => "selector.missing",
            EventType::DataSynced => "data.synced",
            EventType::DataSyncFailed => "data.sync_failed",
            EventType::SystemInfo => "system.info",
            EventType::SystemWarning => "system.warning",
            EventType::SystemError => "system.error",
            EventType::LoginSelectorStatus => "login.selector_status",
        }
    }

    pub fn category(self) -> &'static str {
        self.as_str().split('.').next().unwrap_or("")
    }

    pub fn all() -> &'static [EventType] {
        use EventType::*;
        &[
            JobStarted,
            JobCompleted,
            JobFailed,
            JobCancelled,
            ScraperStarted,
            ScraperCompleted,
            ScraperFailed,
            ScraperBrowserInit,
            ScraperBrowserRestart,
            SkuProcessing,
            SkuSuccess,
            SkuNotFound,
            SkuFailed,
            SkuNoResults,
            ProgressUpdate,
            ProgressWorker,
            SelectorFound,
            SelectorMissing,
            DataSynced,
            DataSyncFailed,
            SystemInfo,
            SystemWarning,
            SystemError,
            LoginSelectorStatus,
        ]
    }
}

/// An immutable structured event (`ScraperEvent`).
///
/// Once constructed, fields are never mutated; publishing a "correction" means emitting a
/// new event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub job_id: Option<String>,
    pub event_id: Uuid,
    pub severity: Severity,
    pub data: HashMap<String, Value>,
}

impl ScraperEvent {
    pub fn new(event_type: EventType, job_id: Option<String>, severity: Severity) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            job_id,
            event_id: Uuid::new_v4(),
            severity,
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn job_started(job_id: impl Into<String>, sku_count: usize, site_count: usize) -> Self {
        Self::new(EventType::JobStarted, Some(job_id.into()), Severity::Info)
            .with_data("sku_count", sku_count as i64)
            .with_data("site_count", site_count as i64)
    }

    pub fn job_completed(job_id: impl Into<String>, successful: usize, failed: usize) -> Self {
        Self::new(EventType::JobCompleted, Some(job_id.into()), Severity::Info)
            .with_data("successful", successful as i64)
            .with_data("failed", failed as i64)
    }

    pub fn job_cancelled(job_id: impl Into<String>) -> Self {
        Self::new(EventType::JobCancelled, Some(job_id.into()), Severity::Warning)
    }

    pub fn sku_processing(job_id: impl Into<String>, site: &str, sku: &str) -> Self {
        Self::new(EventType::SkuProcessing, Some(job_id.into()), Severity::Debug)
            .with_data("site", site)
            .with_data("sku", sku)
    }

    pub fn sku_outcome(
        job_id: impl Into<String>,
        event_type: EventType,
        site: &str,
        sku: &str,
        is_passing: Option<bool>,
    ) -> Self {
        let mut event = Self::new(event_type, Some(job_id.into()), Severity::Info)
            .with_data("site", site)
            .with_data("sku", sku);
        if let Some(passing) = is_passing {
            event = event.with_data("is_passing", passing);
        }
        event
    }
}

/// Filter applied by `EventBus::query`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub job_id: Option<String>,
    pub event_types: Option<Vec<EventType>>,
    pub since: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &ScraperEvent) -> bool {
        if let Some(job_id) = &self.job_id {
            if event.job_id.as_deref() != Some(job_id.as_str()) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}
