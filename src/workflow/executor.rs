//! Workflow executor : runs one site's `WorkflowStep` sequence for one SKU against
//! a [`Page`], wrapping whitelisted actions in the retry executor and applying the post-pass
//! normalization rules to whatever fields survive.
//!
//! Grounded in `original_source/scraper_backend/scrapers/executor/workflow_executor.py`'s
//! `WorkflowExecutor.execute_workflow` step-dispatch loop, redesigned to thread control flow
//! through [`StepOutcome`] instead of a mutable `context["skip"]` flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::page::Page;
use crate::config::{NormalizationRule, SiteConfig, WorkflowStep};
use crate::error::{ErrorContext, FailureKind, ScraperError};
use crate::events::{EventBus, EventType, ScraperEvent, Severity};
use crate::retry::circuit_breaker::CircuitBreaker;
use crate::retry::executor::{CancellationToken, RecoveryHandler, RetryConfig, RetryExecutor};
use crate::failure::FailureClassifier;

use super::actions::transform::apply_transform;
use super::registry::{is_retryable_action, ActionRegistry};
use super::types::{DebugArtifact, ExecutionContext, StepOutcome, WorkflowResult};

/// Tracks whether a site's login session is still considered valid. Sessions expire after a
/// timeout, default sourced from `OrchestratorConfig::session_timeout`.
struct SessionState {
    authenticated_at: Option<Instant>,
}

pub struct WorkflowExecutor {
    retry_executor: Arc<RetryExecutor>,
    registry: Arc<ActionRegistry>,
    event_bus: Option<Arc<EventBus>>,
    session_timeout: Duration,
    sessions: Mutex<HashMap<String, SessionState>>,
    retry_config: RetryConfig,
    recovery_handlers: HashMap<FailureKind, RecoveryHandler>,
}

impl WorkflowExecutor {
    pub fn new(
        circuit_breaker: CircuitBreaker,
        classifier: Arc<FailureClassifier>,
        registry: Arc<ActionRegistry>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            retry_executor: Arc::new(RetryExecutor::new(circuit_breaker, classifier)),
            registry,
            event_bus: None,
            session_timeout,
            sessions: Mutex::new(HashMap::new()),
            retry_config: RetryConfig::default(),
            recovery_handlers: HashMap::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_recovery_handler(mut self, kind: FailureKind, handler: RecoveryHandler) -> Self {
        self.recovery_handlers.insert(kind, handler);
        self
    }

    pub fn retry_executor(&self) -> &Arc<RetryExecutor> {
        &self.retry_executor
    }

    /// True if this site was authenticated within the session timeout window. Test-mode login
    /// re-verification is skipped once already authenticated.
    fn is_session_valid(&self, site: &str) -> bool {
        self.sessions
            .lock()
            .get(site)
            .and_then(|s| s.authenticated_at)
            .is_some_and(|at| at.elapsed() < self.session_timeout)
    }

    fn mark_authenticated(&self, site: &str) {
        self.sessions.lock().insert(
            site.to_string(),
            SessionState {
                authenticated_at: Some(Instant::now()),
            },
        );
    }

    fn emit(&self, event: ScraperEvent) {
        if let Some(bus) = &self.event_bus {
            if let Err(err) = bus.emit(event) {
                warn!(error = %err, "failed to emit workflow event");
            }
        }
    }

    /// Runs `site.workflows` for `sku` against `page`, returning the accumulated result.
    ///
    /// `debug_sink` receives a [`DebugArtifact`] on every step failure when `ctx.debug_mode`
    /// is set, mirroring the Python executor's `_capture_debug_on_failure`.
    pub async fn execute_workflow(
        &self,
        site: &SiteConfig,
        ctx: &ExecutionContext,
        page: &dyn Page,
        cancellation: &CancellationToken,
        mut debug_sink: Option<&mut dyn FnMut(DebugArtifact)>,
    ) -> Result<WorkflowResult, ScraperError> {
        self.registry
            .validate_steps(&site.workflows)
            .map_err(|err| ScraperError::NonRetryableConfig {
                message: err.to_string(),
                context: ErrorContext::for_site(&site.name).with_sku(&ctx.sku),
            })?;

        let mut result = WorkflowResult::default();

        if site.requires_login && !self.is_session_valid(&site.name) {
            if ctx.test_mode {
                debug!(site = %site.name, "test mode: skipping already-unauthenticated login re-check is not applicable, logging in");
            }
            if let Some(login_step) = site.workflows.iter().find(|s| s.action == "login") {
                let outcome = self
                    .run_step(site, login_step, 0, ctx, page, cancellation)
                    .await;
                match outcome {
                    StepOutcome::Ok => self.mark_authenticated(&site.name),
                    StepOutcome::Skip(_) => {}
                    StepOutcome::Fail(kind, detail) => {
                        result.errors.push(detail.clone());
                        return Err(ScraperError::RetryableTransient {
                            kind,
                            message: detail,
                            context: ErrorContext::for_site(&site.name).with_sku(&ctx.sku).with_action("login"),
                        });
                    }
                }
            }
        }

        for (index, step) in site.workflows.iter().enumerate() {
            if step.action == "login" && site.requires_login && self.is_session_valid(&site.name) {
                continue;
            }

            if cancellation.is_cancelled() {
                return Err(ScraperError::Cancelled);
            }

            let outcome = self.run_step(site, step, index, ctx, page, cancellation).await;
            result.steps_executed = index + 1;

            match outcome {
                StepOutcome::Ok => {}
                StepOutcome::Skip(reason) => {
                    info!(site = %site.name, sku = %ctx.sku, step = index, %reason, "workflow halted cleanly");
                    if ctx.get_field("no_results_found").and_then(|v| v.as_bool()).unwrap_or(false) {
                        result.no_results_found = true;
                    }
                    break;
                }
                StepOutcome::Fail(kind, detail) => {
                    if let Some(sink) = debug_sink.as_deref_mut() {
                        if ctx.debug_mode {
                            if let Ok(snapshot) = page.snapshot().await {
                                sink(DebugArtifact {
                                    sku: ctx.sku.clone(),
                                    site: site.name.clone(),
                                    step_index: index,
                                    action: step.action.clone(),
                                    url: snapshot.url,
                                    page_content: snapshot.html,
                                    screenshot_base64: page.screenshot_base64().await.ok(),
                                });
                            }
                        }
                    }
                    result.errors.push(detail.clone());
                    return Err(ScraperError::RetryableTransient {
                        kind,
                        message: detail,
                        context: ErrorContext::for_site(&site.name)
                            .with_sku(&ctx.sku)
                            .with_action(&step.action)
                            .with_step_index(index),
                    });
                }
            }
        }

        self.apply_normalization(site, ctx, &mut result);
        result.success = true;
        Ok(result)
    }

    async fn run_step(
        &self,
        site: &SiteConfig,
        step: &WorkflowStep,
        index: usize,
        ctx: &ExecutionContext,
        page: &dyn Page,
        cancellation: &CancellationToken,
    ) -> StepOutcome {
        let Ok(action) = self.registry.create(&step.action) else {
            return StepOutcome::Fail(FailureKind::ElementMissing, format!("unregistered action: {}", step.action));
        };

        if !is_retryable_action(&step.action) {
            return action.execute(&step.params, ctx, page).await;
        }

        let error_context = ErrorContext::for_site(&site.name)
            .with_sku(&ctx.sku)
            .with_action(&step.action)
            .with_step_index(index);

        let outcome = std::sync::Mutex::new(StepOutcome::Ok);
        let run_result = self
            .retry_executor
            .execute_with_retry(
                &site.name,
                error_context,
                self.retry_config,
                &self.recovery_handlers,
                cancellation,
                || async {
                    match action.execute(&step.params, ctx, page).await {
                        StepOutcome::Ok => {
                            *outcome.lock().expect("outcome mutex poisoned") = StepOutcome::Ok;
                            Ok(())
                        }
                        StepOutcome::Skip(reason) => {
                            *outcome.lock().expect("outcome mutex poisoned") = StepOutcome::Skip(reason);
                            Ok(())
                        }
                        StepOutcome::Fail(kind, detail) => Err((kind, detail)),
                    }
                },
            )
            .await;

        match run_result.result {
            Ok(()) => outcome.into_inner().expect("outcome mutex poisoned"),
            Err(err) => StepOutcome::Fail(err.kind().unwrap_or(FailureKind::NetworkError), err.to_string()),
        }
    }

    /// Applies `site.normalization` rules to `ctx`'s fields, then harvests them into
    /// `result.results`.
    fn apply_normalization(&self, site: &SiteConfig, ctx: &ExecutionContext, result: &mut WorkflowResult) {
        for rule in &site.normalization {
            self.apply_rule(ctx, rule);
        }
        result.results = ctx.snapshot_fields();
    }

    fn apply_rule(&self, ctx: &ExecutionContext, rule: &NormalizationRule) {
        let Some(Value::String(raw)) = ctx.get_field(&rule.field) else {
            return;
        };
        let transformed = apply_transform(&rule.transform, &raw, rule.arg.as_deref());
        ctx.set_field(rule.field.clone(), Value::String(transformed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::page::fake::FakePage;
    use crate::config::{NormalizationTransform, SelectorConfig};
    use crate::retry::circuit_breaker::CircuitBreakerConfig;

    fn executor() -> WorkflowExecutor {
        WorkflowExecutor::new(
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            Arc::new(FailureClassifier::new(vec![], vec![])),
            Arc::new(crate::workflow::registry::register_default_actions()),
            Duration::from_secs(1800),
        )
    }

    fn site_with_steps(steps: Vec<WorkflowStep>) -> SiteConfig {
        let mut site = SiteConfig::new("example", "https://example.test/{sku}");
        site.workflows = steps;
        site
    }

    #[tokio::test]
    async fn runs_extraction_and_normalizes_weight() {
        let mut page = FakePage::default();
        page.texts.insert("#weight".to_string(), "16 oz".to_string());
        let mut site = site_with_steps(vec![
            WorkflowStep::new("extract_single").with_param("selector", "#weight").with_param("field", "weight"),
        ]);
        site.selectors.push(SelectorConfig {
            id: "weight".to_string(),
            name: "weight".to_string(),
            selector: "#weight".to_string(),
            attribute: None,
            multiple: false,
            required: false,
        });
        site.normalization.push(NormalizationRule::new("weight", NormalizationTransform::ExtractWeight));

        let executor = executor();
        let ctx = ExecutionContext::new("example", "SKU1", false, false);
        let token = CancellationToken::new();
        let result = executor
            .execute_workflow(&site, &ctx, &page, &token, None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.results.get("weight"), Some(&Value::String("1.00".to_string())));
    }

    #[tokio::test]
    async fn check_no_results_halts_cleanly_without_error() {
        let page = FakePage {
            present_selectors: vec!["#no-results".to_string()],
            ..Default::default()
        };
        let site = site_with_steps(vec![
            WorkflowStep::new("check_no_results").with_param("selectors", serde_json::json!(["#no-results"])),
            WorkflowStep::new("extract_single").with_param("selector", "#price").with_param("field", "price"),
        ]);

        let executor = executor();
        let ctx = ExecutionContext::new("example", "SKU1", false, false);
        let token = CancellationToken::new();
        let result = executor
            .execute_workflow(&site, &ctx, &page, &token, None)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.no_results_found);
        assert_eq!(result.steps_executed, 1);
    }
}
