//! Error taxonomy for the scraping orchestrator.
//!
//! Mirrors the closed error categories of the specification: every failure a component
//! raises carries a [`FailureKind`] and an [`ErrorContext`] so that the retry executor and
//! the job runner can make uniform retry/propagation decisions without re-inspecting string
//! messages.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of failure kinds the classifier can produce.
///
/// Declaration order doubles as the classifier's tie-break order (see
/// [`crate::failure::classifier`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoResults,
    LoginFailed,
    CaptchaDetected,
    RateLimited,
    PageNotFound,
    AccessDenied,
    NetworkError,
    ElementMissing,
    Timeout,
}

impl FailureKind {
    /// Whether this kind should ever be retried by the retry executor.
    ///
    /// `NoResults` and `PageNotFound` are terminal-but-not-errors: retrying them wastes a
    /// browser round trip against a page that will not change within the retry window.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::NoResults | FailureKind::PageNotFound)
    }

    /// Whether a failure of this kind should count toward the per-site circuit breaker.
    ///
    /// `no_results`/`page_not_found` are legitimate "absent data" outcomes, not site
    /// instability, so they never trip the breaker (Open Question 5 in DESIGN.md).
    pub fn counts_toward_circuit(self) -> bool {
        self.is_retryable()
    }

    /// Minimum backoff floor mandated for this kind, if any.
    pub fn delay_floor(self) -> Option<std::time::Duration> {
        use std::time::Duration;
        match self {
            FailureKind::RateLimited => Some(Duration::from_secs(10)),
            FailureKind::CaptchaDetected => Some(Duration::from_secs(5)),
            FailureKind::AccessDenied => Some(Duration::from_secs(15)),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoResults => "no_results",
            FailureKind::LoginFailed => "login_failed",
            FailureKind::CaptchaDetected => "captcha_detected",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::PageNotFound => "page_not_found",
            FailureKind::AccessDenied => "access_denied",
            FailureKind::NetworkError => "network_error",
            FailureKind::ElementMissing => "element_missing",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debugging context attached to every error raised inside a workflow step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub site_name: Option<String>,
    pub action: Option<String>,
    pub step_index: Option<usize>,
    pub selector: Option<String>,
    pub url: Option<String>,
    pub sku: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub extra: HashMap<String, String>,
}

impl ErrorContext {
    pub fn for_site(site_name: impl Into<String>) -> Self {
        Self {
            site_name: Some(site_name.into()),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_step_index(mut self, index: usize) -> Self {
        self.step_index = Some(index);
        self
    }
}

/// The closed error taxonomy of the specification (§7), one variant per category.
///
/// Every variant carries a [`FailureKind`] (used by the retry executor to decide
/// retryability and circuit-breaker accounting) and an [`ErrorContext`] (used for logging
/// and event payloads).
#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("transient error ({kind}) during {context:?}: {message}")]
    RetryableTransient {
        kind: FailureKind,
        message: String,
        context: ErrorContext,
    },

    #[error("adversarial error ({kind}) during {context:?}: {message}")]
    RetryableAdversarial {
        kind: FailureKind,
        message: String,
        context: ErrorContext,
    },

    #[error("configuration error during {context:?}: {message}")]
    NonRetryableConfig {
        message: String,
        context: ErrorContext,
    },

    #[error("no data ({kind}) during {context:?}: {message}")]
    NonRetryableAbsent {
        kind: FailureKind,
        message: String,
        context: ErrorContext,
    },

    #[error("fatal error during {context:?}: {message}")]
    NonRetryableFatal {
        message: String,
        context: ErrorContext,
    },

    #[error("circuit open for site {site}")]
    CircuitOpen { site: String },

    #[error("max retries ({attempts}) exceeded: {cause}")]
    MaxRetriesExceeded {
        attempts: u32,
        cause: Box<ScraperError>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl ScraperError {
    /// True if the retry executor should attempt another retry for this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScraperError::RetryableTransient { .. } | ScraperError::RetryableAdversarial { .. } => {
                true
            }
            ScraperError::NonRetryableConfig { .. }
            | ScraperError::NonRetryableAbsent { .. }
            | ScraperError::NonRetryableFatal { .. }
            | ScraperError::CircuitOpen { .. }
            | ScraperError::MaxRetriesExceeded { .. }
            | ScraperError::Cancelled => false,
        }
    }

    /// True if this outcome should be surfaced as "success, no data" rather than a job-level
    /// failure (the non-retryable-absent category).
    pub fn is_absent(&self) -> bool {
        matches!(self, ScraperError::NonRetryableAbsent { .. })
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ScraperError::RetryableTransient { context, .. }
            | ScraperError::RetryableAdversarial { context, .. }
            | ScraperError::NonRetryableConfig { context, .. }
            | ScraperError::NonRetryableAbsent { context, .. }
            | ScraperError::NonRetryableFatal { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ScraperError::RetryableTransient { kind, .. }
            | ScraperError::RetryableAdversarial { kind, .. }
            | ScraperError::NonRetryableAbsent { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type ScraperResult<T> = Result<T, ScraperError>;
