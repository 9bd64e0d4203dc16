use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::events::types::{EventFilter, EventType};
use crate::job::types::JobHandle;
use crate::retry::executor::CancellationToken;

use super::state::{AppState, RunningJob};
use super::types::{
    is_log_severity, EventTypesResponse, EventsQuery, EventsResponse, ScrapeRequest,
    ScrapeResponse, StatusResponse, StopResponse,
};

fn generate_job_id() -> String {
    format!("job_{}_{}", Utc::now().format("%Y%m%dT%H%M%S%.6f"), Uuid::new_v4().simple())
}

/// `POST /scrape` : starts a job if none is currently running, else `409`.
pub async fn post_scrape(
    State(state): State<AppState>,
    Json(body): Json<ScrapeRequest>,
) -> (StatusCode, Json<ScrapeResponse>) {
    let mut running = state.running.lock();
    if running.is_some() {
        return (
            StatusCode::CONFLICT,
            Json(ScrapeResponse {
                status: "error",
                job_id: String::new(),
                message: "a job is already running".to_string(),
            }),
        );
    }

    let job_id = generate_job_id();
    let request: crate::config::JobRequest = body.into();
    let handle = Arc::new(JobHandle::new(job_id.clone(), request.clone()));
    let total_skus = request.skus.len().max(1) * request.site_names.len().max(1);

    *running = Some(RunningJob {
        handle: handle.clone(),
        started_at: Utc::now(),
        started_instant: Instant::now(),
        total_skus,
        site_names: request.site_names.clone(),
    });
    drop(running);

    let runner = state.runner.clone();
    let running_slot = state.running.clone();
    let last_summary = state.last_summary.clone();
    let spawned_job_id = job_id.clone();
    let cancellation: CancellationToken = handle.cancellation.clone();

    tokio::spawn(async move {
        let summary = runner.run_with_id(spawned_job_id, request, cancellation).await;
        *last_summary.lock() = Some(summary);
        *running_slot.lock() = None;
    });

    (
        StatusCode::OK,
        Json(ScrapeResponse { status: "started", job_id, message: "job submitted".to_string() }),
    )
}

/// `GET /status` : derives live progress from the event bus rather than keeping a
/// separate mutable counter, since every state transition the status surface cares about is
/// already an emitted event.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let running = state.running.lock();
    let Some(job) = running.as_ref() else {
        let last = state.last_summary.lock();
        return Json(StatusResponse {
            is_running: false,
            job_id: last.as_ref().map(|s| s.job_id.clone()),
            progress: if last.is_some() { 100.0 } else { 0.0 },
            logs: Vec::new(),
            errors: Vec::new(),
            started_at: None,
            active_scrapers: Vec::new(),
            total_skus: last.as_ref().map(|s| s.counters.total).unwrap_or(0),
            completed_skus: last.as_ref().map(|s| s.counters.total).unwrap_or(0),
            eta_seconds: None,
            workers: Default::default(),
        });
    };

    let filter = EventFilter { job_id: Some(job.handle.job_id.clone()), event_types: None, since: None };
    let events = state.event_bus.query(&filter, 2000);

    let completed_skus = events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                EventType::SkuSuccess | EventType::SkuNoResults | EventType::SkuNotFound | EventType::SkuFailed
            )
        })
        .count();

    let logs: Vec<String> = events
        .iter()
        .rev()
        .filter(|e| is_log_severity(e.severity))
        .take(50)
        .map(|e| format!("{} {}", e.event_type.as_str(), serde_json::to_string(&e.data).unwrap_or_default()))
        .collect();

    let errors: Vec<String> = events
        .iter()
        .filter(|e| e.event_type == EventType::SkuFailed)
        .filter_map(|e| e.data.get("sku").and_then(|v| v.as_str()).map(|sku| format!("{sku}: failed")))
        .collect();

    let progress = if job.total_skus == 0 {
        100.0
    } else {
        (completed_skus as f64 / job.total_skus as f64 * 100.0).min(100.0)
    };

    let elapsed = job.started_instant.elapsed().as_secs_f64();
    let eta_seconds = if completed_skus > 0 && completed_skus < job.total_skus {
        let rate = elapsed / completed_skus as f64;
        Some(rate * (job.total_skus - completed_skus) as f64)
    } else {
        None
    };

    Json(StatusResponse {
        is_running: true,
        job_id: Some(job.handle.job_id.clone()),
        progress,
        logs,
        errors,
        started_at: Some(job.started_at),
        active_scrapers: job.site_names.clone(),
        total_skus: job.total_skus,
        completed_skus,
        eta_seconds,
        workers: Default::default(),
    })
}

/// `POST /stop` : signals the running job's [`CancellationToken`] and returns
/// immediately; the job task clears `running` itself once the cancellation propagates.
pub async fn post_stop(State(state): State<AppState>) -> Json<StopResponse> {
    let running = state.running.lock();
    match running.as_ref() {
        Some(job) => {
            job.handle.stop();
            Json(StopResponse { status: "stopping" })
        }
        None => Json(StopResponse { status: "not_running" }),
    }
}

/// `GET /events`.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let event_types = query.event_types.as_ref().map(|csv| {
        csv.split(',')
            .filter_map(|name| EventType::all().iter().find(|e| e.as_str() == name.trim()).copied())
            .collect::<Vec<_>>()
    });
    let filter = EventFilter { job_id: query.job_id, event_types, since: query.since };
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    // Fetch one extra to detect truncation without a second full scan.
    let mut events = state.event_bus.query(&filter, limit + 1);
    let has_more = events.len() > limit;
    events.truncate(limit);
    let total = events.len();

    Json(EventsResponse { events, total, has_more })
}

/// `GET /events/types`.
pub async fn get_event_types() -> Json<EventTypesResponse> {
    Json(EventTypesResponse::build())
}

/// `GET /debug/{kind}` : thin passthrough. Debug-artifact capture lives in the
/// workflow executor, not the façade, so every kind currently returns `501` until a debug
/// session store is wired up as an external collaborator.
pub async fn get_debug(Path(kind): Path<String>) -> (StatusCode, String) {
    (StatusCode::NOT_IMPLEMENTED, format!("debug endpoint '{kind}' not implemented"))
}
