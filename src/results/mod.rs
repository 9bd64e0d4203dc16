//! Result normalization, pass/fail + health derivation, and persistence.

pub mod collector;
pub mod record;

pub use collector::{record_from_raw, CollectorStats, ResultCollector};
pub use record::{
    calculate_health, calculate_is_passing, normalize_weight_to_pounds, summarize_results,
    HealthStatus, ProductRecord, ResultSummary, SkuOutcome, SkuResult, SkuType,
};
