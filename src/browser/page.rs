//! Browser substrate abstraction.
//!
//! The workflow executor and its actions talk to this trait, not to
//! `chromiumoxide` directly, so that action handlers can be exercised against
//! [`FakePage`] in tests without a real Chrome process — mirroring the teacher's
//! `crawl_engine::crawl_types::Crawler` trait seam between orchestration logic and the
//! concrete `chromiumoxide`-backed implementation (`ChromiumoxideCrawler`).

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("selector not found: {0}")]
    SelectorNotFound(String),
    #[error("timeout waiting for: {0}")]
    Timeout(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("browser crashed: {0}")]
    BrowserCrashed(String),
}

/// Snapshot of page state used by the failure classifier and debug capture.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    pub status_code: Option<u16>,
}

/// The subset of browser automation the workflow executor and its actions require.
///
/// Grounded in the action vocabulary of
/// `original_source/scraper_backend/scrapers/executor/workflow_executor.py` (`navigate`,
/// `wait_for`, `click`, `input_text`, selector-based extraction) plus debug snapshotting
/// (`_capture_debug_on_failure`).
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PageError>;
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), PageError>;
    async fn click(&self, selector: &str) -> Result<(), PageError>;
    async fn input_text(&self, selector: &str, text: &str) -> Result<(), PageError>;
    async fn extract_text(&self, selector: &str) -> Result<Option<String>, PageError>;
    async fn extract_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>, PageError>;
    async fn extract_multiple_text(&self, selector: &str) -> Result<Vec<String>, PageError>;
    async fn matched_selectors(&self, candidates: &[String]) -> Result<Vec<String>, PageError>;
    async fn evaluate_script(&self, script: &str) -> Result<serde_json::Value, PageError>;
    async fn scroll(&self, dx: i64, dy: i64) -> Result<(), PageError>;
    async fn screenshot_base64(&self) -> Result<String, PageError>;
    async fn snapshot(&self) -> Result<PageSnapshot, PageError>;
    async fn current_url(&self) -> Result<String, PageError>;
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Canned in-memory `Page` for exercising workflow actions without a browser.
    #[derive(Default)]
    pub struct FakePage {
        pub url: Mutex<String>,
        pub texts: HashMap<String, String>,
        pub attributes: HashMap<(String, String), String>,
        pub multi_texts: HashMap<String, Vec<String>>,
        pub present_selectors: Vec<String>,
        pub html: String,
        pub status_code: Option<u16>,
        pub clicks: Mutex<Vec<String>>,
        pub inputs: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Page for FakePage {
        async fn navigate(&self, url: &str) -> Result<(), PageError> {
            *self.url.lock().await = url.to_string();
            Ok(())
        }

        async fn wait_for_selector(&self, selector: &str, _timeout_ms: u64) -> Result<(), PageError> {
            if self.present_selectors.iter().any(|s| s == selector) {
                Ok(())
            } else {
                Err(PageError::Timeout(selector.to_string()))
            }
        }

        async fn click(&self, selector: &str) -> Result<(), PageError> {
            self.clicks.lock().await.push(selector.to_string());
            Ok(())
        }

        async fn input_text(&self, selector: &str, text: &str) -> Result<(), PageError> {
            self.inputs.lock().await.push((selector.to_string(), text.to_string()));
            Ok(())
        }

        async fn extract_text(&self, selector: &str) -> Result<Option<String>, PageError> {
            Ok(self.texts.get(selector).cloned())
        }

        async fn extract_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>, PageError> {
            Ok(self.attributes.get(&(selector.to_string(), attribute.to_string())).cloned())
        }

        async fn extract_multiple_text(&self, selector: &str) -> Result<Vec<String>, PageError> {
            Ok(self.multi_texts.get(selector).cloned().unwrap_or_default())
        }

        async fn matched_selectors(&self, candidates: &[String]) -> Result<Vec<String>, PageError> {
            Ok(candidates.iter().filter(|c| self.present_selectors.contains(c)).cloned().collect())
        }

        async fn evaluate_script(&self, _script: &str) -> Result<serde_json::Value, PageError> {
            Ok(serde_json::Value::Null)
        }

        async fn scroll(&self, _dx: i64, _dy: i64) -> Result<(), PageError> {
            Ok(())
        }

        async fn screenshot_base64(&self) -> Result<String, PageError> {
            Ok(String::new())
        }

        async fn snapshot(&self) -> Result<PageSnapshot, PageError> {
            Ok(PageSnapshot {
                url: self.url.lock().await.clone(),
                html: self.html.clone(),
                status_code: self.status_code,
            })
        }

        async fn current_url(&self) -> Result<String, PageError> {
            Ok(self.url.lock().await.clone())
        }
    }
}
