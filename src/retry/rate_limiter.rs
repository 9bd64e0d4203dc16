//! Per-site token-bucket rate limiter.
//!
//! Adapted from the teacher's `crawl_engine::rate_limiter`, which packs `(tokens,
//! last_refill_nanos)` into a single `AtomicU128` via `#![feature(integer_atomics)]`. That
//! feature is nightly-only; this version packs into a stable `AtomicU64` instead — tokens as
//! hundredths-of-a-unit in the high 32 bits, a millisecond-granularity refill timestamp in the
//! low 32 bits (Open Question 5 in DESIGN.md) — keeping the same lock-free CAS-loop design at
//! reduced precision, which is adequate at the request-per-second rates this orchestrator runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

const TOKEN_SCALE: u64 = 100;

#[inline(always)]
fn pack(tokens_hundredths: u32, refill_millis: u32) -> u64 {
    ((tokens_hundredths as u64) << 32) | (refill_millis as u64)
}

#[inline(always)]
fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, (state & 0xFFFF_FFFF) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny { retry_after: Duration },
}

struct SiteBucket {
    state: AtomicU64,
    rate_per_sec: f64,
    max_tokens_hundredths: u32,
}

impl SiteBucket {
    fn new(rate_per_sec: f64, base_time: &Instant) -> Self {
        let max_tokens_hundredths = ((rate_per_sec.max(1.0)) * TOKEN_SCALE as f64) as u32;
        let now_millis = base_time.elapsed().as_millis() as u32;
        Self {
            state: AtomicU64::new(pack(max_tokens_hundredths, now_millis)),
            rate_per_sec,
            max_tokens_hundredths,
        }
    }

    fn try_consume(&self, base_time: &Instant) -> RateLimitDecision {
        let now_millis = base_time.elapsed().as_millis() as u32;
        let mut current = self.state.load(Ordering::Relaxed);

        loop {
            let (tokens, last_refill) = unpack(current);
            let elapsed_millis = now_millis.saturating_sub(last_refill);
            let refill_amount = ((elapsed_millis as f64 / 1000.0) * self.rate_per_sec * TOKEN_SCALE as f64) as u32;
            let refilled_tokens = tokens.saturating_add(refill_amount).min(self.max_tokens_hundredths);

            if refilled_tokens < TOKEN_SCALE as u32 {
                let deficit = TOKEN_SCALE as u32 - refilled_tokens;
                let millis_needed = if self.rate_per_sec > 0.0 {
                    ((deficit as f64 / TOKEN_SCALE as f64) / self.rate_per_sec * 1000.0) as u64
                } else {
                    1
                };
                let new_state = pack(refilled_tokens, now_millis);
                if self
                    .state
                    .compare_exchange_weak(current, new_state, Ordering::AcqRel, Ordering::Relaxed)
                    .is_err()
                {
                    current = self.state.load(Ordering::Relaxed);
                    continue;
                }
                return RateLimitDecision::Deny {
                    retry_after: Duration::from_millis(millis_needed.max(1)),
                };
            }

            let new_tokens = refilled_tokens - TOKEN_SCALE as u32;
            let new_state = pack(new_tokens, now_millis);
            match self.state.compare_exchange_weak(current, new_state, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return RateLimitDecision::Allow,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

/// Lock-free per-site token-bucket rate limiter. Each site key maps to its own bucket, sized by
/// that site's configured requests-per-second.
pub struct RateLimiter {
    buckets: DashMap<String, Arc<SiteBucket>>,
    base_time: Instant,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            base_time: Instant::now(),
        }
    }

    pub fn check(&self, site: &str, rate_per_sec: f64) -> RateLimitDecision {
        if rate_per_sec <= 0.0 {
            return RateLimitDecision::Allow;
        }
        let bucket = Arc::clone(
            self.buckets
                .entry(site.to_string())
                .or_insert_with(|| Arc::new(SiteBucket::new(rate_per_sec, &self.base_time)))
                .value(),
        );
        bucket.try_consume(&self.base_time)
    }

    pub fn clear(&self) {
        self.buckets.clear();
    }

    pub fn tracked_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_allowed_second_denied() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.check("site-a", 1.0), RateLimitDecision::Allow);
        assert!(matches!(limiter.check("site-a", 1.0), RateLimitDecision::Deny { .. }));
    }

    #[test]
    fn zero_rate_never_limits() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert_eq!(limiter.check("site-b", 0.0), RateLimitDecision::Allow);
        }
    }

    #[test]
    fn independent_sites_have_independent_buckets() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.check("site-c", 1.0), RateLimitDecision::Allow);
        assert_eq!(limiter.check("site-d", 1.0), RateLimitDecision::Allow);
    }
}
