//! Configuration for the scraping orchestrator.
//!
//! `SiteConfig`/`OrchestratorConfig`/`JobRequest` , following the teacher's
//! `CrawlConfig` builder-with-getters file split.

pub mod builder;
pub mod getters;
pub mod methods;
pub mod store;
pub mod types;

pub use builder::{Complete, JobRequestBuilder, WithSites, WithSkus};
pub use store::{ConfigStore, ConfigStoreError, InMemoryConfigStore, ScrapeStatus, SharedConfigStore, TestResult};
pub use types::{
    JobRequest, LoginConfig, NormalizationRule, NormalizationTransform, OrchestratorConfig,
    SelectorConfig, SiteConfig, ValidationConfig, WorkflowStep,
};
