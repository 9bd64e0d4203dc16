//! Job Runner: composes the scheduler, workflow executor, retry/circuit-breaker stack, the
//! per-site browser pool, and the result collector into the single entry point that runs one
//! submitted job request to completion.
//!
//! Startup/barrier/stagger sequencing and worker allocation are grounded in
//! `original_source/scraper_backend/core/scheduler.py`'s `create_orchestrator_from_settings`;
//! the worker loop, batch-restart, and test-mode aggregation are implemented fresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Barrier;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::chromium_page::ChromiumPage;
use crate::browser::page::Page;
use crate::browser_setup::{apply_stealth_measures, launch_browser};
use crate::config::store::SkuResultSummary;
use crate::config::{
    ConfigStore, JobRequest, OrchestratorConfig, ScrapeStatus, SharedConfigStore, SiteConfig,
    TestResult,
};
use crate::error::{FailureKind, ScraperError};
use crate::events::{EventBus, EventType, ScraperEvent, Severity};
use crate::failure::FailureClassifier;
use crate::results::collector::{record_from_raw, ResultCollector};
use crate::results::record::{calculate_health, calculate_is_passing, SkuOutcome, SkuResult, SkuType};
use crate::retry::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::retry::executor::{CancellationToken, RecoveryHandler, RetryConfig};
use crate::scheduler::{Orchestrator, SiteConcurrency};
use crate::workflow::registry::{register_default_actions, ActionRegistry};
use crate::workflow::types::{DebugArtifact, ExecutionContext};
use crate::workflow::WorkflowExecutor;

use super::page_pool::{PagePool, PageProvider};
use super::types::{JobCounters, JobStatus, JobSummary};

/// Produces fresh Chrome tabs from one pre-warmed `chromiumoxide` browser per job. Each worker
/// owns its tab exclusively; the underlying OS process is shared since launching one Chrome
/// per worker would be wasteful when only tab-level isolation is required.
struct ChromeBrowserProvider {
    browser: chromiumoxide::Browser,
    _handler: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl PageProvider for ChromeBrowserProvider {
    async fn create_page(&self) -> anyhow::Result<Box<dyn Page>> {
        let page = self.browser.new_page("about:blank").await?;
        apply_stealth_measures(&page).await?;
        Ok(Box::new(ChromiumPage::new(page)))
    }
}

async fn build_provider(headless: bool) -> anyhow::Result<ChromeBrowserProvider> {
    let (browser, handler, _profile_dir) = launch_browser(headless, None).await?;
    Ok(ChromeBrowserProvider { browser, _handler: handler })
}

fn default_recovery_handlers() -> HashMap<FailureKind, RecoveryHandler> {
    let mut handlers = HashMap::new();
    handlers.insert(FailureKind::CaptchaDetected, wait_handler(Duration::from_secs(5)));
    handlers.insert(FailureKind::RateLimited, wait_handler(Duration::from_secs(30)));
    handlers.insert(FailureKind::AccessDenied, wait_handler(Duration::from_secs(15)));
    handlers
}

/// A recovery handler that has no access to the page (the recovery hook signature takes only
/// an [`crate::error::ErrorContext`]) so the best it can do is wait out the condition before
/// the next retry attempt.
fn wait_handler(delay: Duration) -> RecoveryHandler {
    Arc::new(move |_ctx: &crate::error::ErrorContext| {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            true
        }) as futures::future::BoxFuture<'static, bool>
    })
}

fn generate_job_id() -> String {
    format!("job_{}_{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f"), Uuid::new_v4().simple())
}

fn failed_summary(job_id: String) -> JobSummary {
    JobSummary {
        job_id,
        status: JobStatus::Completed,
        counters: JobCounters::default(),
        site_health: HashMap::new(),
        session_path: None,
    }
}

/// Runs a single [`JobRequest`] to completion: loads every requested site's configuration,
/// partitions its SKU set across a start-barriered, staggered pool of owned browser tabs,
/// drains the per-site queues through [`Orchestrator`], and aggregates outcomes into a
/// [`JobSummary`].
pub struct JobRunner {
    config_store: SharedConfigStore,
    event_bus: Arc<EventBus>,
    registry: Arc<ActionRegistry>,
    config: OrchestratorConfig,
    output_dir: std::path::PathBuf,
}

impl JobRunner {
    pub fn new(
        config_store: SharedConfigStore,
        event_bus: Arc<EventBus>,
        config: OrchestratorConfig,
        output_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            config_store,
            event_bus,
            registry: Arc::new(register_default_actions()),
            config,
            output_dir: output_dir.into(),
        }
    }

    fn emit(&self, event: ScraperEvent) {
        if let Err(err) = self.event_bus.emit(event) {
            warn!(error = %err, "failed to emit job event");
        }
    }

    pub async fn run(&self, request: JobRequest, cancellation: CancellationToken) -> JobSummary {
        self.run_with_id(generate_job_id(), request, cancellation).await
    }

    /// Runs a job under a caller-supplied id (the HTTP façade generates the id up front so
    /// that `JobHandle::job_id` is known before the job task starts running).
    pub async fn run_with_id(
        &self,
        job_id: String,
        request: JobRequest,
        cancellation: CancellationToken,
    ) -> JobSummary {
        info!(job_id = %job_id, skus = request.skus.len(), sites = request.site_names.len(), "job starting");
        self.emit(ScraperEvent::job_started(job_id.clone(), request.skus.len(), request.site_names.len()));

        let mut site_configs = Vec::new();
        for name in &request.site_names {
            match self.config_store.get_scraper(name).await {
                Ok(site) if site.disabled => warn!(site = %name, "site disabled, skipping"),
                Ok(site) => site_configs.push(site),
                Err(err) => warn!(site = %name, error = %err, "failed to load site config, skipping"),
            }
        }

        let collector = match ResultCollector::new(&self.output_dir, request.test_mode) {
            Ok(collector) => collector,
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to initialize result collector, aborting job");
                self.emit(
                    ScraperEvent::new(EventType::JobFailed, Some(job_id.clone()), Severity::Critical)
                        .with_data("error", err.to_string()),
                );
                return failed_summary(job_id);
            }
        };

        let max_workers = request.max_workers.unwrap_or(self.config.max_workers);
        let mut orchestrator = Orchestrator::new(max_workers);

        // Per-site worker count: explicit override else `max(1, max_workers / num_sites)`
        // (SPEC_FULL §4.7 step 4); login-required sites are clamped to 1 by
        // `SiteConcurrency::effective_max_workers` regardless of this default.
        let num_sites = site_configs.len().max(1);
        let default_site_workers = (max_workers / num_sites).max(1);

        let mut site_skus: HashMap<String, Vec<(String, SkuType)>> = HashMap::new();
        let mut site_num_workers: HashMap<String, usize> = HashMap::new();
        for site in &site_configs {
            let requested_workers = request.per_site_workers.get(&site.name).copied().unwrap_or(default_site_workers);
            let scheduler = orchestrator.register_site(
                site.name.clone(),
                SiteConcurrency { requires_login: site.requires_login, site_max_workers: requested_workers },
            );
            site_num_workers.insert(site.name.clone(), scheduler.num_workers());

            let skus: Vec<(String, SkuType)> = if request.test_mode {
                site.test_skus
                    .iter()
                    .cloned()
                    .map(|s| (s, SkuType::Test))
                    .chain(site.fake_skus.iter().cloned().map(|s| (s, SkuType::Fake)))
                    .collect()
            } else {
                request.skus.iter().cloned().map(|s| (s, SkuType::Test)).collect()
            };
            for (sku, _) in &skus {
                scheduler.enqueue(sku.clone());
            }
            site_skus.insert(site.name.clone(), skus);
        }

        let total_workers = orchestrator.total_workers();
        let barrier = Arc::new(Barrier::new(total_workers.max(1)));
        let batch_size = (self.config.batch_size as u32).min(self.config.browser_max_use_count).max(1);

        let pool_starts = site_configs.iter().map(|site| {
            let num_workers = site_num_workers[&site.name];
            let barrier = barrier.clone();
            async move {
                let provider: Arc<dyn PageProvider> = Arc::new(build_provider(self.config.headless).await?);
                let pool = PagePool::start(&site.name, provider, num_workers, batch_size, barrier, self.config.stagger_delay).await?;
                Ok::<_, anyhow::Error>((site.name.clone(), pool))
            }
        });

        let pools: HashMap<String, PagePool> = match futures::future::try_join_all(pool_starts).await {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to initialize browser pools, aborting job");
                self.emit(
                    ScraperEvent::new(EventType::JobFailed, Some(job_id.clone()), Severity::Critical)
                        .with_data("error", err.to_string()),
                );
                return failed_summary(job_id);
            }
        };
        for site in &site_configs {
            self.emit(
                ScraperEvent::new(EventType::ScraperBrowserInit, Some(job_id.clone()), Severity::Info)
                    .with_data("site", site.name.clone()),
            );
        }

        let mut executors: HashMap<String, WorkflowExecutor> = HashMap::new();
        for site in &site_configs {
            let validation = site.validation.clone().unwrap_or_default();
            let classifier = Arc::new(FailureClassifier::new(
                validation.no_results_selectors.clone(),
                validation.no_results_text_patterns.clone(),
            ));
            let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
            let mut executor =
                WorkflowExecutor::new(circuit_breaker, classifier, self.registry.clone(), self.config.session_timeout)
                    .with_event_bus(self.event_bus.clone())
                    .with_retry_config(RetryConfig::default());
            for (kind, handler) in default_recovery_handlers() {
                executor = executor.with_recovery_handler(kind, handler);
            }
            executors.insert(site.name.clone(), executor);
            self.emit(
                ScraperEvent::new(EventType::ScraperStarted, Some(job_id.clone()), Severity::Info)
                    .with_data("site", site.name.clone()),
            );
        }

        let site_configs_by_name: HashMap<String, &SiteConfig> = site_configs.iter().map(|s| (s.name.clone(), s)).collect();
        let site_sku_types: HashMap<String, HashMap<String, SkuType>> =
            site_skus.iter().map(|(site, list)| (site.clone(), list.iter().cloned().collect())).collect();
        let site_results: StdMutex<HashMap<String, Vec<SkuResult>>> =
            StdMutex::new(site_configs.iter().map(|s| (s.name.clone(), Vec::new())).collect());

        let scraper_fn = |site_name: String, sku: String| {
            let site = site_configs_by_name[&site_name];
            let pool = &pools[&site_name];
            let executor = &executors[&site_name];
            let sku_type = site_sku_types.get(&site_name).and_then(|m| m.get(&sku)).copied().unwrap_or(SkuType::Test);
            async move {
                self.process_sku(
                    &job_id,
                    site,
                    site_name,
                    sku,
                    sku_type,
                    executor,
                    pool,
                    &cancellation,
                    request.debug_mode,
                    request.test_mode,
                    &collector,
                    &site_results,
                )
                .await
            }
        };

        let watcher = async {
            loop {
                if cancellation.is_cancelled() {
                    orchestrator.shutdown();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        };

        let (_, _) = tokio::join!(orchestrator.run(scraper_fn), watcher);

        let results_snapshot = site_results.lock().expect("site results mutex poisoned").clone();

        let mut counters = JobCounters::default();
        for results in results_snapshot.values() {
            for result in results {
                counters.total += 1;
                match result.outcome {
                    SkuOutcome::Success => counters.successful += 1,
                    SkuOutcome::NoResults => counters.no_results += 1,
                    SkuOutcome::NotFound => counters.not_found += 1,
                    SkuOutcome::Error => counters.failed += 1,
                }
            }
        }

        let mut site_health = HashMap::new();
        if request.test_mode {
            for site in &site_configs {
                let results = results_snapshot.get(&site.name).cloned().unwrap_or_default();
                let health = calculate_health(&results, site.has_fake_skus());
                site_health.insert(site.name.clone(), health);
                self.config_store.update_scraper_health(&site.name, health).await;
                let summary = TestResult { health, results: results.iter().map(SkuResultSummary::from).collect() };
                self.config_store.update_scraper_test_result(&site.name, summary).await;
            }
        }

        for site in &site_configs {
            let results = results_snapshot.get(&site.name).cloned().unwrap_or_default();
            let successful = results.iter().filter(|r| r.outcome == SkuOutcome::Success).count();
            self.emit(
                ScraperEvent::new(EventType::ScraperCompleted, Some(job_id.clone()), Severity::Info)
                    .with_data("site", site.name.clone())
                    .with_data("processed", results.len() as i64)
                    .with_data("successful", successful as i64),
            );
        }

        let status = if cancellation.is_cancelled() { JobStatus::Cancelled } else { JobStatus::Completed };
        match status {
            JobStatus::Cancelled => self.emit(ScraperEvent::job_cancelled(job_id.clone())),
            _ => self.emit(ScraperEvent::job_completed(job_id.clone(), counters.successful, counters.failed)),
        }

        let session_path = collector.save_session();
        info!(job_id = %job_id, total = counters.total, successful = counters.successful, failed = counters.failed, "job finished");

        JobSummary { job_id, status, counters, site_health, session_path: Some(session_path) }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_sku(
        &self,
        job_id: &str,
        site: &SiteConfig,
        site_name: String,
        sku: String,
        sku_type: SkuType,
        executor: &WorkflowExecutor,
        pool: &PagePool,
        cancellation: &CancellationToken,
        debug_mode: bool,
        test_mode: bool,
        collector: &ResultCollector,
        site_results: &StdMutex<HashMap<String, Vec<SkuResult>>>,
    ) -> Result<(), String> {
        self.emit(ScraperEvent::sku_processing(job_id.to_string(), &site_name, &sku));

        let ctx = ExecutionContext::new(site_name.clone(), sku.clone(), test_mode, debug_mode).with_job_id(job_id.to_string());
        let started = Instant::now();
        let mut debug_log: Vec<DebugArtifact> = Vec::new();

        let outcome = pool
            .with_page(|page| {
                let debug_log = &mut debug_log;
                async move {
                    let mut sink = |artifact: DebugArtifact| debug_log.push(artifact);
                    let debug_sink: Option<&mut dyn FnMut(DebugArtifact)> = if debug_mode { Some(&mut sink) } else { None };
                    executor.execute_workflow(site, &ctx, page, cancellation, debug_sink).await
                }
            })
            .await;

        let duration = started.elapsed().as_secs_f64();

        let workflow_result = match outcome {
            Ok(inner) => inner,
            Err(pool_err) => Err(ScraperError::NonRetryableFatal {
                message: pool_err.to_string(),
                context: crate::error::ErrorContext::for_site(site_name.clone()).with_sku(sku.clone()),
            }),
        };

        let (sku_outcome, error_message) = match &workflow_result {
            Ok(result) if result.no_results_found => (SkuOutcome::NoResults, None),
            Ok(result) => {
                let raw = serde_json::to_value(&result.results).unwrap_or(serde_json::Value::Null);
                let mut record = record_from_raw(&raw);
                record.sku = sku.clone();
                record.filter_images();
                if record.has_data() {
                    let quality = site.image_quality.as_deref().and_then(|q| q.parse::<u8>().ok()).unwrap_or(80);
                    collector.add(&sku, &site_name, record, quality);
                    (SkuOutcome::Success, None)
                } else {
                    (SkuOutcome::NoResults, None)
                }
            }
            Err(err) if err.kind() == Some(FailureKind::PageNotFound) => (SkuOutcome::NotFound, Some(err.to_string())),
            Err(err) if err.is_absent() => (SkuOutcome::NoResults, Some(err.to_string())),
            Err(ScraperError::Cancelled) => (SkuOutcome::Error, Some("cancelled".to_string())),
            Err(err) => (SkuOutcome::Error, Some(err.to_string())),
        };

        let mut sku_result = SkuResult::new(sku.clone(), sku_type, sku_outcome);
        sku_result.error = error_message.clone();
        sku_result.duration_seconds = Some(duration);
        site_results
            .lock()
            .expect("site results mutex poisoned")
            .entry(site_name.clone())
            .or_default()
            .push(sku_result);

        let event_type = match sku_outcome {
            SkuOutcome::Success => EventType::SkuSuccess,
            SkuOutcome::NoResults => EventType::SkuNoResults,
            SkuOutcome::NotFound => EventType::SkuNotFound,
            SkuOutcome::Error => EventType::SkuFailed,
        };
        let is_passing = calculate_is_passing(sku_type, sku_outcome);
        self.emit(ScraperEvent::sku_outcome(job_id.to_string(), event_type, &site_name, &sku, Some(is_passing)));

        if !test_mode {
            let status = match sku_outcome {
                SkuOutcome::Success => ScrapeStatus::Scraped,
                SkuOutcome::NoResults => ScrapeStatus::NoResults,
                SkuOutcome::NotFound => ScrapeStatus::NotFound,
                SkuOutcome::Error => ScrapeStatus::Error,
            };
            self.config_store.record_scrape_status(&sku, &site_name, status, error_message.clone()).await;
            if sku_outcome == SkuOutcome::Success {
                if let Ok(result) = &workflow_result {
                    let raw = serde_json::to_value(&result.results).unwrap_or_default();
                    self.config_store.update_product_source(&sku, &site_name, raw).await;
                }
            }
        }

        match sku_outcome {
            SkuOutcome::Error => Err(error_message.unwrap_or_else(|| "unknown error".to_string())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InMemoryConfigStore, SiteConfig};
    use crate::events::EventBusConfig;

    fn demo_site() -> SiteConfig {
        let mut site = SiteConfig::new("demo", "https://example.com/{sku}");
        site.site_max_workers = 1;
        site.test_skus = vec!["sku-1".to_string()];
        site.workflows = vec![crate::config::WorkflowStep::new("navigate").with_param("url", "https://example.com/{sku}")];
        site
    }

    #[tokio::test]
    async fn empty_request_completes_with_zero_counters() {
        let store: SharedConfigStore = Arc::new(InMemoryConfigStore::new());
        let bus = Arc::new(EventBus::new(EventBusConfig::default()));
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(store, bus, OrchestratorConfig::default(), dir.path());

        let request = JobRequest::new(vec![], vec![]);
        let summary = runner.run(request, CancellationToken::new()).await;

        assert_eq!(summary.counters.total, 0);
        assert_eq!(summary.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn skipped_when_site_is_disabled() {
        let store = InMemoryConfigStore::new();
        let mut site = demo_site();
        site.disabled = true;
        store.insert_scraper(site);
        let store: SharedConfigStore = Arc::new(store);
        let bus = Arc::new(EventBus::new(EventBusConfig::default()));
        let dir = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(store, bus, OrchestratorConfig::default(), dir.path());

        let request = JobRequest::new(vec!["sku-1".to_string()], vec!["demo".to_string()]);
        let summary = runner.run(request, CancellationToken::new()).await;

        assert_eq!(summary.counters.total, 0);
    }
}
