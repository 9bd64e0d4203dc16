//! Core configuration types for the scraping orchestrator.
//!
//! Replaces the teacher's crawl-mirroring `CrawlConfig` with the domain types this system
//! actually schedules against: a site's scraper configuration, the orchestrator-wide
//! concurrency/runtime configuration, and a job request. Layout (`types`/`builder`/
//! `methods`/`getters`/`mod`) follows the teacher's own split.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named locator, looked up first by `id`, then by `name` (`SelectorConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub id: String,
    pub name: String,
    pub selector: String,
    pub attribute: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub required: bool,
}

/// One step of a site's workflow: a registered action name plus an opaque parameter map.
/// Parameter values may contain `{name}`-style placeholders resolved against the per-task
/// execution context (`WorkflowStep`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

impl WorkflowStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// "No results" detection config consulted by the `check_no_results` action and the failure
/// classifier's page-content path (config-store schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub no_results_selectors: Vec<String>,
    #[serde(default)]
    pub no_results_text_patterns: Vec<String>,
}

/// Login workflow parameters for the `login` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub url: String,
    pub username_field: String,
    pub password_field: String,
    pub submit_button: String,
    pub success_indicator: String,
    #[serde(default = "default_login_timeout")]
    pub timeout: Duration,
    /// Credentials are loaded from the environment and never logged; the fields themselves
    /// stay `None` at rest ("credentials... never logged").
    #[serde(skip)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_login_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Declarative post-pass normalization rule applied to a named result field (step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationRule {
    pub field: String,
    pub transform: NormalizationTransform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationTransform {
    Lower,
    Upper,
    Title,
    Trim,
    StripPrefix,
    ExtractWeight,
}

/// A single site's scraper configuration (`SiteConfig`, §6 config-store schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub requires_login: bool,
    pub site_max_workers: usize,
    pub url_template: String,
    #[serde(default)]
    pub selectors: Vec<SelectorConfig>,
    #[serde(default)]
    pub workflows: Vec<WorkflowStep>,
    #[serde(default = "default_site_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub test_skus: Vec<String>,
    #[serde(default)]
    pub fake_skus: Vec<String>,
    #[serde(default)]
    pub validation: Option<ValidationConfig>,
    #[serde(default)]
    pub login: Option<LoginConfig>,
    #[serde(default)]
    pub normalization: Vec<NormalizationRule>,
    #[serde(default)]
    pub image_quality: Option<String>,
    #[serde(default)]
    pub rate_limit_rps: Option<f64>,
}

fn default_site_timeout() -> Duration {
    Duration::from_secs(30)
}

impl SiteConfig {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_login: false,
            site_max_workers: 1,
            url_template: url_template.into(),
            selectors: Vec::new(),
            workflows: Vec::new(),
            timeout: default_site_timeout(),
            disabled: false,
            test_skus: Vec::new(),
            fake_skus: Vec::new(),
            validation: None,
            login: None,
            normalization: Vec::new(),
            image_quality: None,
            rate_limit_rps: None,
        }
    }

    /// `1` if `requires_login`, else `min(site_max_workers, global_max)` (invariant).
    pub fn effective_max_workers(&self, global_max: usize) -> usize {
        if self.requires_login {
            1
        } else {
            self.site_max_workers.min(global_max).max(1)
        }
    }

    pub fn selector(&self, id_or_name: &str) -> Option<&SelectorConfig> {
        self.selectors
            .iter()
            .find(|s| s.id == id_or_name)
            .or_else(|| self.selectors.iter().find(|s| s.name == id_or_name))
    }

    pub fn has_fake_skus(&self) -> bool {
        !self.fake_skus.is_empty()
    }
}

/// Orchestrator-wide runtime configuration, an ambient expansion of the
/// `CrawlConfig` builder-with-getters shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_workers: usize,
    #[serde(default)]
    pub per_site_workers: HashMap<String, usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stagger_delay")]
    pub stagger_delay: Duration,
    #[serde(default = "default_session_timeout")]
    pub session_timeout: Duration,
    #[serde(default = "default_browser_headless")]
    pub headless: bool,
    #[serde(default = "default_browser_use_count")]
    pub browser_max_use_count: u32,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_batch_size() -> usize {
    20
}
fn default_stagger_delay() -> Duration {
    Duration::from_millis(500)
}
fn default_session_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_browser_headless() -> bool {
    true
}
fn default_browser_use_count() -> u32 {
    50
}
fn default_api_port() -> u16 {
    8000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            per_site_workers: HashMap::new(),
            batch_size: default_batch_size(),
            stagger_delay: default_stagger_delay(),
            session_timeout: default_session_timeout(),
            headless: default_browser_headless(),
            browser_max_use_count: default_browser_use_count(),
            api_port: default_api_port(),
        }
    }
}

impl OrchestratorConfig {
    /// Reads `API_PORT` from the environment, falling back to `default_api_port()`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(port) = port.parse() {
                self.api_port = port;
            }
        }
        self
    }
}

/// A submitted job request (contract, `POST /scrape` body of).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub skus: Vec<String>,
    pub site_names: Vec<String>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub per_site_workers: HashMap<String, usize>,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub debug_mode: bool,
}

impl JobRequest {
    pub fn new(skus: Vec<String>, site_names: Vec<String>) -> Self {
        Self {
            skus,
            site_names,
            max_workers: None,
            per_site_workers: HashMap::new(),
            test_mode: false,
            debug_mode: false,
        }
    }
}
