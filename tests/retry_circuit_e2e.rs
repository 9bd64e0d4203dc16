//! End-to-end retry/circuit-breaker scenarios from the specification's testable-properties
//! section: circuit trip + cooldown + recovery (scenario 5), the rate-limited delay floor
//! (scenario 4), and cancellation mid-backoff (scenario 6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrape_orchestrator::error::{ErrorContext, FailureKind};
use scrape_orchestrator::failure::FailureClassifier;
use scrape_orchestrator::retry::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use scrape_orchestrator::retry::executor::RetryConfig;
use scrape_orchestrator::{CircuitBreaker, RetryExecutor};

fn classifier() -> Arc<FailureClassifier> {
    Arc::new(FailureClassifier::new(vec![], vec![]))
}

/// Scenario 5: 5 consecutive failures trip the breaker; the 6th call is rejected without
/// invoking the operation at all; after the cooldown elapses, 2 consecutive probe successes
/// close the circuit again.
#[tokio::test(start_paused = true)]
async fn circuit_trips_after_five_failures_and_recovers_after_cooldown() {
    let config = CircuitBreakerConfig {
        failure_threshold: 5,
        success_threshold: 2,
        cooldown: Duration::from_secs(60),
        half_open_concurrency: 3,
    };
    let breaker = CircuitBreaker::new(config);

    for _ in 0..5 {
        let guard = breaker.try_acquire("site-x").expect("closed circuit admits calls");
        guard.failure("boom");
    }
    assert_eq!(breaker.health("site-x").unwrap().state, CircuitState::Open);

    let invocation_count = Arc::new(AtomicU32::new(0));
    let executor = RetryExecutor::new(breaker, classifier());
    let counter = invocation_count.clone();
    let outcome = executor
        .execute_with_retry::<(), _, _>(
            "site-x",
            ErrorContext::for_site("site-x"),
            RetryConfig::default(),
            &HashMap::new(),
            &Default::default(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;
    assert!(matches!(outcome.result, Err(scrape_orchestrator::error::ScraperError::CircuitOpen { .. })));
    assert_eq!(invocation_count.load(Ordering::SeqCst), 0, "the open circuit must reject before invoking the operation");

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(executor.circuit_breaker().health("site-x").unwrap().state, CircuitState::Open, "state flips to half_open lazily on next probe");

    for _ in 0..2 {
        let guard = executor.circuit_breaker().try_acquire("site-x").expect("cooldown elapsed, half-open admits probes");
        guard.success();
    }
    assert_eq!(executor.circuit_breaker().health("site-x").unwrap().state, CircuitState::Closed);
}

/// Scenario 4: a rate-limit-classified failure on every attempt accumulates at least
/// `max_retries * 10s` of total delay before the final attempt, respecting the per-kind floor.
#[tokio::test(start_paused = true)]
async fn rate_limited_failures_respect_the_ten_second_floor() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    let executor = RetryExecutor::new(breaker, classifier());

    let config = RetryConfig { max_retries: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_secs(30) };
    let outcome = executor
        .execute_with_retry::<(), _, _>(
            "site-rl",
            ErrorContext::for_site("site-rl"),
            config,
            &HashMap::new(),
            &Default::default(),
            move || async move { Err((FailureKind::RateLimited, "429 too many requests".to_string())) },
        )
        .await;

    assert!(outcome.result.is_err());
    assert_eq!(outcome.attempts, config.max_retries + 1);
    let floor = Duration::from_secs(10) * config.max_retries;
    assert!(outcome.total_delay >= floor, "total delay {:?} must be at least {:?}", outcome.total_delay, floor);
}

/// Scenario 6: cancelling the stop signal during a backoff sleep returns immediately with
/// `cancelled = true` rather than waiting out the full delay.
#[tokio::test]
async fn cancellation_during_backoff_returns_immediately() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    let executor = RetryExecutor::new(breaker, classifier());
    let cancellation = scrape_orchestrator::retry::executor::CancellationToken::new();

    let config = RetryConfig { max_retries: 5, base_delay: Duration::from_secs(5), max_delay: Duration::from_secs(60) };

    let cancel_handle = cancellation.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_handle.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = executor
        .execute_with_retry::<(), _, _>(
            "site-cancel",
            ErrorContext::for_site("site-cancel"),
            config,
            &HashMap::new(),
            &cancellation,
            move || async move { Err((FailureKind::NetworkError, "connection reset".to_string())) },
        )
        .await;
    canceller.await.unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.result.is_err());
    assert!(started.elapsed() < Duration::from_secs(1), "cancellation must interrupt the backoff sleep, not wait it out");
}

/// Invariant 8: non-retryable kinds (e.g. `page_not_found`) short-circuit without consuming
/// the circuit breaker's failure budget, and never retry.
#[tokio::test]
async fn non_retryable_kind_short_circuits_without_retry() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    let executor = RetryExecutor::new(breaker, classifier());
    let invocation_count = Arc::new(AtomicU32::new(0));
    let counter = invocation_count.clone();

    let outcome = executor
        .execute_with_retry::<(), _, _>(
            "site-404",
            ErrorContext::for_site("site-404"),
            RetryConfig::default(),
            &HashMap::new(),
            &Default::default(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err((FailureKind::PageNotFound, "404".to_string()))
                }
            },
        )
        .await;

    assert_eq!(invocation_count.load(Ordering::SeqCst), 1, "non-retryable failures must not be retried");
    assert!(outcome.result.is_err());
    assert_eq!(executor.circuit_breaker().health("site-404").unwrap().state, CircuitState::Closed, "page_not_found must not count toward the breaker");
}
