//! Cross-module pipeline: a raw scrape payload flows through `record_from_raw` normalization,
//! the frozen-price/has-data invariants, the Result Collector, and health derivation — the
//! same path the Job Runner drives per SKU (§4.4, §4.7, §8 invariant 6 and 9).

use scrape_orchestrator::results::collector::record_from_raw;
use scrape_orchestrator::results::record::{calculate_health, calculate_is_passing, SkuOutcome, SkuResult, SkuType};
use scrape_orchestrator::ResultCollector;

#[test]
fn record_from_raw_filters_non_http_images_and_normalizes_weight() {
    let raw = serde_json::json!({
        "Name": "Widget",
        "Brand": "Acme",
        "Weight": "2.3kg",
        "Images": ["https://example.com/a.jpg", "javascript:alert(1)", "ftp://example.com/b.jpg", "http://example.com/c.jpg"],
        "ScrapedPrice": "19.99",
    });
    let mut record = record_from_raw(&raw);
    record.filter_images();

    assert_eq!(record.weight.as_deref(), Some("2.3kg"));
    assert_eq!(record.images, vec!["https://example.com/a.jpg", "http://example.com/c.jpg"]);
    assert!(record.has_data());
}

/// Invariant 6 (frozen-field law): the canonical record's `sku` and `price` always equal the
/// originating input, never a scraper-supplied `scraped_price`, even though the scraper's
/// value is retained for reference.
#[test]
fn scraped_price_never_displaces_the_frozen_input_price() {
    let raw = serde_json::json!({ "Name": "Widget", "ScrapedPrice": "999.99" });
    let mut record = record_from_raw(&raw);
    record.sku = "SKU-1".to_string();
    record.price = Some("9.99".to_string()); // the source-of-truth input price, set by the caller

    assert_eq!(record.sku, "SKU-1");
    assert_eq!(record.price.as_deref(), Some("9.99"), "frozen input price must survive scraper output");
    assert_eq!(record.scraped_price.as_deref(), Some("999.99"), "scraper's own price is kept for reference only");
}

#[test]
fn empty_record_is_a_no_op_write() {
    let raw = serde_json::json!({});
    let record = record_from_raw(&raw);
    assert!(!record.has_data());
}

/// Collector never persists a "no data" write, and `get` reflects only SKUs that had data.
#[test]
fn collector_skips_no_op_writes_and_reports_stats() {
    let dir = tempfile::tempdir().unwrap();
    let collector = ResultCollector::new(dir.path(), false).unwrap();

    let empty = record_from_raw(&serde_json::json!({}));
    collector.add("sku-empty", "site-a", empty, 80);
    assert!(collector.get("sku-empty").is_empty());

    let populated = record_from_raw(&serde_json::json!({ "Name": "Widget" }));
    collector.add("sku-1", "site-a", populated, 90);
    let fetched = collector.get("sku-1");
    assert_eq!(fetched["site-a"].name.as_deref(), Some("Widget"));

    let stats = collector.stats();
    assert_eq!(stats.total_unique_skus, 1);
}

/// Test mode never touches disk: the session file must not exist after `add`.
#[test]
fn test_mode_collector_never_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let collector = ResultCollector::new(dir.path(), true).unwrap();
    let record = record_from_raw(&serde_json::json!({ "Name": "Widget" }));
    collector.add("sku-1", "site-a", record, 80);

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty(), "test_mode must not write a session file");
}

/// End-to-end boundary case: a fake SKU that unexpectedly returns `success` (instead of the
/// `no_results` a fake SKU should get) fails its passing check and drags health down even
/// though the paired test SKU passes cleanly.
#[test]
fn fake_sku_returning_success_fails_health_despite_passing_test_sku() {
    let fake_result = SkuResult::new("FAKE-1", SkuType::Fake, SkuOutcome::Success);
    assert!(!fake_result.is_passing, "fake SKUs only pass on no_results");
    assert!(!calculate_is_passing(SkuType::Fake, SkuOutcome::Success));

    let test_result = SkuResult::new("T-1", SkuType::Test, SkuOutcome::Success);
    let health = calculate_health(&[fake_result, test_result], true);
    assert_ne!(health, scrape_orchestrator::results::record::HealthStatus::Healthy);
}
