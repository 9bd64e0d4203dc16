//! `scrape_orchestrator` — the concurrency engine behind a distributed, browser-driven product
//! scraper: scheduler, workflow executor, retry/circuit-breaker stack, failure classifier,
//! result collector, and structured event bus.
//!
//! The HTTP façade, the browser automation backend, the workflow DSL's parsing, and the
//! persistence backend's storage medium are external collaborators; this crate defines the
//! interfaces it needs from them (see [`config::store::ConfigStore`], [`browser::page::Page`])
//! without implementing the collaborators themselves.

pub mod browser;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod error;
pub mod events;
pub mod failure;
pub mod http;
pub mod job;
pub mod results;
pub mod retry;
pub mod scheduler;
pub mod utils;
pub mod workflow;

pub use config::{JobRequest, OrchestratorConfig, SiteConfig};
pub use error::{ErrorContext, FailureKind, ScraperError};
pub use events::{EventBus, EventBusConfig, EventType, ScraperEvent, Severity};
pub use failure::{FailureClassifier, FailureContext};
pub use job::{JobCounters, JobHandle, JobRunner, JobStatus, JobSummary};
pub use results::{HealthStatus, ProductRecord, ResultCollector, SkuOutcome, SkuResult, SkuType};
pub use retry::{CircuitBreaker, RateLimiter, RetryExecutor};
pub use scheduler::Orchestrator;
pub use workflow::WorkflowExecutor;

use std::sync::Arc;

use config::store::{InMemoryConfigStore, SharedConfigStore};

/// Builds the default in-process wiring for the job-control HTTP surface: an in-memory
/// config store, a fresh event bus, and a [`job::JobRunner`] writing session fallbacks under
/// `output_dir`.
///
/// Swap `config_store` for a real persistence-backed [`config::store::ConfigStore`]
/// implementation in production; this constructor exists so the façade has something to run
/// against out of the box.
pub fn default_app_state(
    config: OrchestratorConfig,
    output_dir: impl Into<std::path::PathBuf>,
) -> http::AppState {
    let config_store: SharedConfigStore = Arc::new(InMemoryConfigStore::new());
    let event_bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let runner = Arc::new(JobRunner::new(config_store.clone(), event_bus.clone(), config.clone(), output_dir));
    http::AppState::new(runner, event_bus, config_store, config)
}

/// Starts the job-control HTTP server on `addr`, serving the router built by [`http::router`].
///
/// Non-blocking: the server runs on the current Tokio runtime in the background and this
/// function returns once the listener is bound.
pub async fn start_server(
    addr: std::net::SocketAddr,
    state: http::AppState,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = http::router(state);
    Ok(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "http server exited with error");
        }
    }))
}
