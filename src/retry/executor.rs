//! Retry executor: exponential backoff with jitter, per-kind delay floors, circuit-breaker
//! gating, and cancellation-aware waiting.
//!
//! Ported from `original_source/scraper_backend/core/retry_executor.py`'s
//! `RetryExecutor.execute_with_retry`, generalized from its synchronous/threaded Python shape
//! to `tokio`. The per-site circuit breaker here is [`super::circuit_breaker::CircuitBreaker`]
//! rather than the Python class's private dict-based state machine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::{ErrorContext, FailureKind, ScraperError};
use crate::failure::FailureClassifier;

use super::circuit_breaker::CircuitBreaker;

/// Per-call retry configuration. Defaults mirror the Python `AdaptiveRetryConfig` baseline.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ScraperError>,
    pub attempts: u32,
    pub total_delay: Duration,
    pub cancelled: bool,
}

/// Cooperative cancellation handle, checked before each retry delay.
#[derive(Clone, Default)]
pub struct CancellationToken {
    notify: Arc<Notify>,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Executes operations with adaptive retry, circuit breaking, and recovery hooks.
///
/// `recovery_handlers` mirrors the Python executor's `_register_recovery_handlers`: a
/// best-effort action run before the next retry attempt for specific failure kinds (e.g.
/// sleeping out a rate limit, clearing cookies after an access-denied response).
pub struct RetryExecutor {
    circuit_breaker: CircuitBreaker,
    classifier: Arc<FailureClassifier>,
    recent_failures: DashMap<String, u32>,
}

pub type RecoveryHandler =
    Arc<dyn Fn(&ErrorContext) -> futures::future::BoxFuture<'static, bool> + Send + Sync>;

impl RetryExecutor {
    pub fn new(circuit_breaker: CircuitBreaker, classifier: Arc<FailureClassifier>) -> Self {
        Self {
            circuit_breaker,
            classifier,
            recent_failures: DashMap::new(),
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Run `operation` (an async closure producing a fresh future per attempt) with retry.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        site_name: &str,
        mut context: ErrorContext,
        config: RetryConfig,
        recovery_handlers: &HashMap<FailureKind, RecoveryHandler>,
        cancellation: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, (FailureKind, String)>>,
    {
        let Ok(guard) = self.circuit_breaker.try_acquire(site_name) else {
            warn!(site = site_name, "circuit breaker open, rejecting call");
            return RetryOutcome {
                result: Err(ScraperError::CircuitOpen {
                    site: site_name.to_string(),
                }),
                attempts: 0,
                total_delay: Duration::ZERO,
                cancelled: false,
            };
        };

        context.max_retries = config.max_retries;
        let mut attempt = 0u32;
        let mut total_delay = Duration::ZERO;

        loop {
            context.retry_count = attempt;

            match operation().await {
                Ok(value) => {
                    guard.success();
                    self.recent_failures.remove(site_name);
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                        total_delay,
                        cancelled: false,
                    };
                }
                Err((kind, message)) => {
                    warn!(
                        site = site_name,
                        attempt = attempt + 1,
                        max_retries = config.max_retries + 1,
                        kind = %kind,
                        "attempt failed: {message}"
                    );

                    let retryable = kind.is_retryable();
                    if kind.counts_toward_circuit() {
                        *self.recent_failures.entry(site_name.to_string()).or_insert(0) += 1;
                    }

                    if !retryable {
                        guard.failure(&message);
                        return RetryOutcome {
                            result: Err(self.terminal_error(kind, message, context)),
                            attempts: attempt + 1,
                            total_delay,
                            cancelled: false,
                        };
                    }

                    if attempt >= config.max_retries {
                        guard.failure(&message);
                        let cause = self.terminal_error(kind, message, context.clone());
                        return RetryOutcome {
                            result: Err(ScraperError::MaxRetriesExceeded {
                                attempts: attempt + 1,
                                cause: Box::new(cause),
                            }),
                            attempts: attempt + 1,
                            total_delay,
                            cancelled: false,
                        };
                    }

                    if let Some(handler) = recovery_handlers.get(&kind) {
                        if handler(&context).await {
                            info!(site = site_name, kind = %kind, "recovery succeeded, retrying without consuming an attempt");
                            continue;
                        }
                    }

                    let failure_count = *self.recent_failures.get(site_name).map(|v| *v).get_or_insert(1);
                    let delay = self.calculate_delay(config, attempt, kind, failure_count);
                    total_delay += delay;

                    if cancellation.is_cancelled() {
                        guard.failure(&message);
                        return RetryOutcome {
                            result: Err(self.terminal_error(kind, message, context)),
                            attempts: attempt + 1,
                            total_delay,
                            cancelled: true,
                        };
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancellation.notify.notified() => {
                            guard.failure(&message);
                            return RetryOutcome {
                                result: Err(self.terminal_error(kind, message, context)),
                                attempts: attempt + 1,
                                total_delay,
                                cancelled: true,
                            };
                        }
                    }

                    attempt += 1;
                }
            }
        }
    }

    fn terminal_error(&self, kind: FailureKind, message: String, context: ErrorContext) -> ScraperError {
        if kind.is_retryable() {
            ScraperError::RetryableTransient {
                kind,
                message,
                context,
            }
        } else if matches!(kind, FailureKind::NoResults | FailureKind::PageNotFound) {
            ScraperError::NonRetryableAbsent {
                kind,
                message,
                context,
            }
        } else {
            ScraperError::NonRetryableFatal { message, context }
        }
    }

    /// `min(base * 2^attempt, cap) * (1 + 0.1 * recent_failures)`, floored per failure kind,
    /// plus additive uniform jitter of 0-10% of the computed delay.
    fn calculate_delay(&self, config: RetryConfig, attempt: u32, kind: FailureKind, recent_failures: u32) -> Duration {
        let base = config.base_delay.as_secs_f64();
        let exp = base * 2f64.powi(attempt as i32);
        let capped = exp.min(config.max_delay.as_secs_f64());
        let adaptive_multiplier = 1.0 + 0.1 * recent_failures.min(10) as f64;
        let mut delay = capped * adaptive_multiplier;

        if let Some(floor) = kind.delay_floor() {
            delay = delay.max(floor.as_secs_f64());
        }

        let jitter = delay * 0.1 * rand::rng().random::<f64>();
        Duration::from_secs_f64((delay + jitter).max(0.0))
    }

    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::circuit_breaker::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> RetryExecutor {
        RetryExecutor::new(
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            Arc::new(FailureClassifier::new(vec![], vec![])),
        )
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let exec = executor();
        let handlers = HashMap::new();
        let token = CancellationToken::new();
        let outcome: RetryOutcome<i32> = exec
            .execute_with_retry(
                "site",
                ErrorContext::for_site("site"),
                RetryConfig::default(),
                &handlers,
                &token,
                || async { Ok(42) },
            )
            .await;
        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let exec = executor();
        let handlers = HashMap::new();
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<i32> = exec
            .execute_with_retry(
                "site",
                ErrorContext::for_site("site"),
                RetryConfig {
                    max_retries: 3,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(10),
                },
                &handlers,
                &token,
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err((FailureKind::NetworkError, "transient".to_string()))
                    } else {
                        Ok(7)
                    }
                },
            )
            .await;
        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let exec = executor();
        let handlers = HashMap::new();
        let token = CancellationToken::new();
        let outcome: RetryOutcome<i32> = exec
            .execute_with_retry(
                "site",
                ErrorContext::for_site("site"),
                RetryConfig::default(),
                &handlers,
                &token,
                || async { Err((FailureKind::PageNotFound, "nope".to_string())) },
            )
            .await;
        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_reports_max_retries_exceeded() {
        let exec = executor();
        let handlers = HashMap::new();
        let token = CancellationToken::new();
        let outcome: RetryOutcome<i32> = exec
            .execute_with_retry(
                "site",
                ErrorContext::for_site("site"),
                RetryConfig {
                    max_retries: 1,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                },
                &handlers,
                &token,
                || async { Err((FailureKind::NetworkError, "still failing".to_string())) },
            )
            .await;
        assert!(matches!(outcome.result, Err(ScraperError::MaxRetriesExceeded { .. })));
        assert_eq!(outcome.attempts, 2);
    }
}
