//! Retry, circuit breaking, and rate limiting.

pub mod circuit_breaker;
pub mod executor;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitGuard, CircuitState, SiteHealth};
pub use executor::{CancellationToken, RecoveryHandler, RetryConfig, RetryExecutor, RetryOutcome};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
