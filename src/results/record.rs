//! Canonical product record, weight normalization, and pass/fail/health derivation.
//!
//! `calculate_is_passing`/`calculate_health` are ported verbatim from
//! `original_source/scraper_backend/scrapers/models/result.py` — the priority-ordered branches
//! below match that file's `calculate_health` exactly.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuType {
    Test,
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuOutcome {
    Success,
    NoResults,
    NotFound,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Broken,
    Unknown,
}

/// `(sku_type == fake ∧ outcome == no_results) ∨ (sku_type == test ∧ outcome == success)`.
pub fn calculate_is_passing(sku_type: SkuType, outcome: SkuOutcome) -> bool {
    match sku_type {
        SkuType::Fake => outcome == SkuOutcome::NoResults,
        SkuType::Test => outcome == SkuOutcome::Success,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuResult {
    pub sku: String,
    pub sku_type: SkuType,
    pub outcome: SkuOutcome,
    pub is_passing: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl SkuResult {
    pub fn new(sku: impl Into<String>, sku_type: SkuType, outcome: SkuOutcome) -> Self {
        Self {
            sku: sku.into(),
            is_passing: calculate_is_passing(sku_type, outcome),
            sku_type,
            outcome,
            data: None,
            error: None,
            duration_seconds: None,
        }
    }
}

/// Priority-ordered health derivation: empty -> unknown, full test+fake coverage both passing
/// (or test-only coverage passing with no fakes configured) -> healthy, all passing but partial
/// coverage -> degraded, nothing passing -> broken, anything else -> degraded.
pub fn calculate_health(results: &[SkuResult], config_has_fake_skus: bool) -> HealthStatus {
    if results.is_empty() {
        return HealthStatus::Unknown;
    }

    let test_results: Vec<&SkuResult> = results.iter().filter(|r| r.sku_type == SkuType::Test).collect();
    let fake_results: Vec<&SkuResult> = results.iter().filter(|r| r.sku_type == SkuType::Fake).collect();

    let test_passing = test_results.iter().filter(|r| r.is_passing).count();
    let fake_passing = fake_results.iter().filter(|r| r.is_passing).count();

    let has_test_coverage = !test_results.is_empty();
    let has_fake_coverage = !fake_results.is_empty();

    let all_tests_pass = if test_results.is_empty() { true } else { test_passing == test_results.len() };
    let all_fakes_pass = if fake_results.is_empty() { true } else { fake_passing == fake_results.len() };

    if has_test_coverage && has_fake_coverage && all_tests_pass && all_fakes_pass {
        HealthStatus::Healthy
    } else if has_test_coverage && all_tests_pass && !config_has_fake_skus {
        HealthStatus::Healthy
    } else if all_tests_pass && all_fakes_pass {
        HealthStatus::Degraded
    } else if test_passing == 0 && fake_passing == 0 {
        HealthStatus::Broken
    } else {
        HealthStatus::Degraded
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSummary {
    pub total: usize,
    pub test_total: usize,
    pub test_passing: usize,
    pub test_failing: usize,
    pub fake_total: usize,
    pub fake_passing: usize,
    pub fake_failing: usize,
    pub outcome_success: usize,
    pub outcome_no_results: usize,
    pub outcome_not_found: usize,
    pub outcome_error: usize,
}

pub fn summarize_results(results: &[SkuResult]) -> ResultSummary {
    let mut summary = ResultSummary {
        total: results.len(),
        ..Default::default()
    };
    for result in results {
        match result.sku_type {
            SkuType::Test => {
                summary.test_total += 1;
                if result.is_passing {
                    summary.test_passing += 1;
                } else {
                    summary.test_failing += 1;
                }
            }
            SkuType::Fake => {
                summary.fake_total += 1;
                if result.is_passing {
                    summary.fake_passing += 1;
                } else {
                    summary.fake_failing += 1;
                }
            }
        }
        match result.outcome {
            SkuOutcome::Success => summary.outcome_success += 1,
            SkuOutcome::NoResults => summary.outcome_no_results += 1,
            SkuOutcome::NotFound => summary.outcome_not_found += 1,
            SkuOutcome::Error => summary.outcome_error += 1,
        }
    }
    summary
}

/// Canonical scraped-product shape . `sku` and `price` are frozen: they originate
/// from the source-of-truth input and are never overwritten by scraped content, even though a
/// scraper may report its own `scraped_price` for reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    pub sku: String,
    pub price: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub weight: Option<String>,
    pub images: Vec<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub product_type: Option<String>,
    pub scraped_price: Option<String>,
    pub image_quality: u8,
}

impl ProductRecord {
    /// Any of Name/Brand/Weight/ScrapedPrice non-empty ("has data" test).
    pub fn has_data(&self) -> bool {
        [&self.name, &self.brand, &self.weight, &self.scraped_price]
            .into_iter()
            .any(|field| field.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// Keep only http(s) image URLs.
    pub fn filter_images(&mut self) {
        self.images.retain(|url| url.starts_with("http://") || url.starts_with("https://"));
    }
}

/// Parses a free-text weight like `"5 lbs"`, `"2.3kg"`, `"12 oz"` into pounds, two-decimal
/// string form. Unparseable input is passed through unchanged.
pub fn normalize_weight_to_pounds(raw: &str) -> String {
    let re = Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(lbs?|lb|oz|kg|g)?").expect("static regex is valid");
    let Some(caps) = re.captures(raw) else {
        return raw.to_string();
    };
    let Some(amount_match) = caps.get(1) else {
        return raw.to_string();
    };
    let Ok(amount) = amount_match.as_str().parse::<f64>() else {
        return raw.to_string();
    };
    let unit = caps.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
    let pounds = match unit.as_str() {
        "oz" => amount / 16.0,
        "kg" => amount * 2.20462,
        "g" => amount * 0.00220462,
        _ => amount, // lb, lbs, or no unit: assume pounds
    };
    format!("{pounds:.2}")
}

pub fn extra_fields_map(value: &Value) -> HashMap<String, Value> {
    value
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_sku_passes_on_no_results() {
        assert!(calculate_is_passing(SkuType::Fake, SkuOutcome::NoResults));
        assert!(!calculate_is_passing(SkuType::Fake, SkuOutcome::Success));
    }

    #[test]
    fn test_sku_passes_on_success_only() {
        assert!(calculate_is_passing(SkuType::Test, SkuOutcome::Success));
        assert!(!calculate_is_passing(SkuType::Test, SkuOutcome::NoResults));
    }

    #[test]
    fn health_healthy_with_full_coverage() {
        let results = vec![
            SkuResult::new("t1", SkuType::Test, SkuOutcome::Success),
            SkuResult::new("f1", SkuType::Fake, SkuOutcome::NoResults),
        ];
        assert_eq!(calculate_health(&results, true), HealthStatus::Healthy);
    }

    #[test]
    fn health_healthy_without_fake_skus_configured() {
        let results = vec![SkuResult::new("t1", SkuType::Test, SkuOutcome::Success)];
        assert_eq!(calculate_health(&results, false), HealthStatus::Healthy);
    }

    #[test]
    fn health_degraded_with_missing_coverage() {
        let results = vec![SkuResult::new("t1", SkuType::Test, SkuOutcome::Success)];
        assert_eq!(calculate_health(&results, true), HealthStatus::Degraded);
    }

    #[test]
    fn health_broken_when_nothing_passes() {
        let results = vec![
            SkuResult::new("t1", SkuType::Test, SkuOutcome::Error),
            SkuResult::new("f1", SkuType::Fake, SkuOutcome::Success),
        ];
        assert_eq!(calculate_health(&results, true), HealthStatus::Broken);
    }

    #[test]
    fn health_unknown_when_empty() {
        assert_eq!(calculate_health(&[], true), HealthStatus::Unknown);
    }

    #[test]
    fn weight_conversion_handles_all_units() {
        assert_eq!(normalize_weight_to_pounds("5 lbs"), "5.00");
        assert_eq!(normalize_weight_to_pounds("16 oz"), "1.00");
        assert_eq!(normalize_weight_to_pounds("1 kg"), "2.20");
        assert_eq!(normalize_weight_to_pounds("1000 g"), "2.20");
    }

    #[test]
    fn has_data_requires_at_least_one_populated_field() {
        let mut record = ProductRecord::default();
        assert!(!record.has_data());
        record.name = Some("Widget".to_string());
        assert!(record.has_data());
    }

    #[test]
    fn filter_images_drops_non_http_urls() {
        let mut record = ProductRecord {
            images: vec!["https://a.com/x.jpg".into(), "data:image/png;base64,abc".into()],
            ..Default::default()
        };
        record.filter_images();
        assert_eq!(record.images, vec!["https://a.com/x.jpg".to_string()]);
    }
}
