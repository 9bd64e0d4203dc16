//! Event bus wire format and multi-job buffering, plus the job-request typestate builder and
//! the per-site worker-cap invariant, exercised end-to-end through the public API.

use std::time::Duration;

use scrape_orchestrator::config::builder::JobRequestBuilder;
use scrape_orchestrator::config::SiteConfig;
use scrape_orchestrator::events::config::EventBusConfig;
use scrape_orchestrator::events::types::EventFilter;
use scrape_orchestrator::{EventBus, EventType, ScraperEvent, Severity};

/// Events round-trip through JSON with the declared `snake_case` wire names, and a
/// deserialized event still satisfies the same filter as the original.
#[test]
fn event_serializes_to_the_documented_wire_shape_and_round_trips() {
    let event = ScraperEvent::job_started("job-42", 3, 2);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event_type"], "job_started");
    assert_eq!(json["severity"], "info");
    assert_eq!(json["job_id"], "job-42");
    assert_eq!(json["data"]["sku_count"], 3);

    let round_tripped: ScraperEvent = serde_json::from_value(json).unwrap();
    assert_eq!(round_tripped.event_type, EventType::JobStarted);
    assert_eq!(round_tripped.job_id.as_deref(), Some("job-42"));

    let filter = EventFilter { job_id: Some("job-42".into()), ..Default::default() };
    assert!(filter.matches(&round_tripped));
}

#[test]
fn event_type_wire_strings_and_categories_match_the_closed_taxonomy() {
    assert_eq!(EventType::SkuNoResults.as_str(), "sku.no_results");
    assert_eq!(EventType::SkuNoResults.category(), "sku");
    assert_eq!(EventType::LoginSelectorStatus.as_str(), "login.selector_status");
    assert_eq!(EventType::all().len(), 24);
}

/// The per-job buffer evicts the oldest job once `max_jobs` is exceeded (LRU), while the
/// global ring buffer keeps the most recent events across every job.
#[tokio::test]
async fn per_job_buffer_lru_evicts_oldest_job_when_over_capacity() {
    let mut config = EventBusConfig::default();
    config.max_jobs = 2;
    let bus = EventBus::new(config);

    bus.emit(ScraperEvent::job_started("job-a", 1, 1)).unwrap();
    bus.emit(ScraperEvent::job_started("job-b", 1, 1)).unwrap();
    bus.emit(ScraperEvent::job_started("job-c", 1, 1)).unwrap();

    let job_a_events = bus.query(&EventFilter { job_id: Some("job-a".into()), ..Default::default() }, 10);
    assert!(job_a_events.is_empty(), "job-a must be evicted once a 3rd distinct job appears");

    let job_c_events = bus.query(&EventFilter { job_id: Some("job-c".into()), ..Default::default() }, 10);
    assert_eq!(job_c_events.len(), 1);
}

/// `since` filtering excludes events emitted before the cutoff, even when job/type match.
#[tokio::test]
async fn since_filter_excludes_events_before_the_cutoff() {
    let bus = EventBus::new(EventBusConfig::default());
    bus.emit(ScraperEvent::job_started("job-1", 1, 1)).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let cutoff = chrono::Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;

    bus.emit(ScraperEvent::job_completed("job-1", 1, 0)).unwrap();

    let filter = EventFilter { job_id: Some("job-1".into()), since: Some(cutoff), event_types: None };
    let events = bus.query(&filter, 10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::JobCompleted);
}

/// The typestate builder only exposes `.build()` once both `skus` and `site_names` have been
/// supplied, and `test_mode`/`max_workers` carry through regardless of when they're set.
#[test]
fn typestate_builder_requires_skus_then_site_names_before_build() {
    let request = JobRequestBuilder::new()
        .skus(vec!["SKU-1".into(), "SKU-2".into()])
        .site_names(vec!["site-a".into()])
        .max_workers(8)
        .test_mode(true)
        .build();

    assert_eq!(request.skus.len(), 2);
    assert_eq!(request.site_names, vec!["site-a".to_string()]);
    assert_eq!(request.max_workers, Some(8));
    assert!(request.test_mode);
    assert!(!request.debug_mode);
}

/// Invariant: a login site's effective worker cap is always 1, regardless of its configured
/// `site_max_workers` or the global cap; a non-login site is capped at `min(site, global)`.
#[test]
fn effective_max_workers_forces_login_sites_to_one() {
    let mut login_site = SiteConfig::new("login-site", "https://example.com/{sku}");
    login_site.requires_login = true;
    login_site.site_max_workers = 10;
    assert_eq!(login_site.effective_max_workers(4), 1);

    let mut normal_site = SiteConfig::new("normal-site", "https://example.com/{sku}");
    normal_site.site_max_workers = 10;
    assert_eq!(normal_site.effective_max_workers(4), 4);
    assert_eq!(normal_site.effective_max_workers(20), 10);
}
