//! Persistence interface for scraper configuration and test/health results.
//!
//! The config/persistence backend is treated as an external collaborator reached through a
//! narrow sync interface. This module defines that boundary as a trait, plus an in-process
//! `DashMap`-backed reference implementation — the same pattern used elsewhere in this crate
//! for `SearchEngineCache`/`CrawlRegistry` (an internal registry trait realized by
//! a concurrent map, no external service required to run the crate's test suite).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::results::record::{HealthStatus, SkuResult};

use super::types::SiteConfig;

/// Scrape status recorded per (SKU, site) pair (`record_scrape_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStatus {
    Pending,
    Scraped,
    NotFound,
    Error,
    NoResults,
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub health: HealthStatus,
    pub results: Vec<SkuResultSummary>,
}

#[derive(Debug, Clone)]
pub struct SkuResultSummary {
    pub sku: String,
    pub outcome: String,
    pub is_passing: bool,
    pub selectors_found: Vec<String>,
    pub selectors_missing: Vec<String>,
}

impl From<&SkuResult> for SkuResultSummary {
    fn from(result: &SkuResult) -> Self {
        Self {
            sku: result.sku.clone(),
            outcome: format!("{:?}", result.outcome),
            is_passing: result.is_passing,
            selectors_found: Vec::new(),
            selectors_missing: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("scraper config not found: {0}")]
    NotFound(String),
}

/// The persistence interface the core consumes , kept narrow and synchronous in
/// spirit even though the trait methods are `async` to allow a real SQL/document-store
/// implementation behind it without forcing a blocking call onto the `tokio` runtime.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_scraper(&self, name: &str) -> Result<SiteConfig, ConfigStoreError>;
    async fn record_scrape_status(
        &self,
        sku: &str,
        site: &str,
        status: ScrapeStatus,
        error_message: Option<String>,
    );
    async fn update_product_source(&self, sku: &str, site: &str, record: serde_json::Value);
    async fn update_scraper_test_result(&self, name: &str, result: TestResult);
    async fn update_scraper_health(&self, name: &str, health: HealthStatus);
}

#[derive(Debug, Clone)]
struct ScrapeStatusRow {
    status: ScrapeStatus,
    error_message: Option<String>,
}

/// In-process reference implementation of [`ConfigStore`], backed by concurrent maps.
/// Suitable for tests and single-process deployments; a `sqlx`-SQLite implementation can
/// satisfy the same trait for durable multi-process deployments.
#[derive(Default)]
pub struct InMemoryConfigStore {
    scrapers: DashMap<String, SiteConfig>,
    scrape_status: DashMap<(String, String), ScrapeStatusRow>,
    product_sources: DashMap<(String, String), serde_json::Value>,
    test_results: DashMap<String, TestResult>,
    health: DashMap<String, HealthStatus>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scrapers(scrapers: Vec<SiteConfig>) -> Self {
        let store = Self::default();
        for scraper in scrapers {
            store.scrapers.insert(scraper.name.clone(), scraper);
        }
        store
    }

    pub fn insert_scraper(&self, config: SiteConfig) {
        self.scrapers.insert(config.name.clone(), config);
    }

    pub fn scrape_status(&self, sku: &str, site: &str) -> Option<(ScrapeStatus, Option<String>)> {
        self.scrape_status
            .get(&(sku.to_string(), site.to_string()))
            .map(|row| (row.status, row.error_message.clone()))
    }

    pub fn product_source(&self, sku: &str, site: &str) -> Option<serde_json::Value> {
        self.product_sources.get(&(sku.to_string(), site.to_string())).map(|v| v.clone())
    }

    pub fn test_result(&self, name: &str) -> Option<TestResult> {
        self.test_results.get(name).map(|v| v.clone())
    }

    pub fn health(&self, name: &str) -> Option<HealthStatus> {
        self.health.get(name).map(|v| *v)
    }

    pub fn all_scrapers(&self) -> HashMap<String, SiteConfig> {
        self.scrapers.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_scraper(&self, name: &str) -> Result<SiteConfig, ConfigStoreError> {
        self.scrapers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigStoreError::NotFound(name.to_string()))
    }

    async fn record_scrape_status(
        &self,
        sku: &str,
        site: &str,
        status: ScrapeStatus,
        error_message: Option<String>,
    ) {
        self.scrape_status
            .insert((sku.to_string(), site.to_string()), ScrapeStatusRow { status, error_message });
    }

    async fn update_product_source(&self, sku: &str, site: &str, record: serde_json::Value) {
        self.product_sources.insert((sku.to_string(), site.to_string()), record);
    }

    async fn update_scraper_test_result(&self, name: &str, result: TestResult) {
        self.test_results.insert(name.to_string(), result);
    }

    async fn update_scraper_health(&self, name: &str, health: HealthStatus) {
        self.health.insert(name.to_string(), health);
    }
}

pub type SharedConfigStore = Arc<dyn ConfigStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reads_back_scrape_status() {
        let store = InMemoryConfigStore::new();
        store
            .record_scrape_status("sku1", "site-a", ScrapeStatus::Scraped, None)
            .await;
        let (status, _) = store.scrape_status("sku1", "site-a").unwrap();
        assert_eq!(status, ScrapeStatus::Scraped);
    }

    #[tokio::test]
    async fn missing_scraper_is_an_error() {
        let store = InMemoryConfigStore::new();
        assert!(store.get_scraper("nope").await.is_err());
    }

    #[tokio::test]
    async fn stored_scraper_round_trips() {
        let store = InMemoryConfigStore::new();
        store.insert_scraper(SiteConfig::new("demo", "https://example.com/{sku}"));
        let config = store.get_scraper("demo").await.unwrap();
        assert_eq!(config.name, "demo");
    }
}
