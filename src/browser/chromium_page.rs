//! `chromiumoxide`-backed [`Page`] implementation.
//!
//! Adapted from the teacher's browser handling in `browser_pool::PooledBrowserWrapper` and
//! `crawl_engine::crawler::ChromiumoxideCrawler` — this crate's action handlers only need a
//! single page's worth of CDP calls, not a whole crawl session, so the wrapper here is much
//! thinner than the teacher's pool.

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::Page as CdpPage;
use std::time::Duration;

use super::page::{Page, PageError, PageSnapshot};

pub struct ChromiumPage {
    inner: CdpPage,
}

impl ChromiumPage {
    pub fn new(inner: CdpPage) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), PageError> {
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.inner.find_element(selector))
            .await
            .map_err(|_| PageError::Timeout(selector.to_string()))?
            .map_err(|e| PageError::SelectorNotFound(format!("{selector}: {e}")))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let element = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| PageError::SelectorNotFound(format!("{selector}: {e}")))?;
        element.click().await.map_err(|e| PageError::Evaluation(e.to_string()))?;
        Ok(())
    }

    async fn input_text(&self, selector: &str, text: &str) -> Result<(), PageError> {
        let element = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| PageError::SelectorNotFound(format!("{selector}: {e}")))?;
        element.type_str(text).await.map_err(|e| PageError::Evaluation(e.to_string()))?;
        Ok(())
    }

    async fn extract_text(&self, selector: &str) -> Result<Option<String>, PageError> {
        match self.inner.find_element(selector).await {
            Ok(element) => element.inner_text().await.map_err(|e| PageError::Evaluation(e.to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn extract_attribute(&self, selector: &str, attribute: &str) -> Result<Option<String>, PageError> {
        match self.inner.find_element(selector).await {
            Ok(element) => element
                .attribute(attribute)
                .await
                .map_err(|e| PageError::Evaluation(e.to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn extract_multiple_text(&self, selector: &str) -> Result<Vec<String>, PageError> {
        let elements = self
            .inner
            .find_elements(selector)
            .await
            .map_err(|e| PageError::Evaluation(e.to_string()))?;
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            if let Ok(Some(text)) = element.inner_text().await {
                texts.push(text);
            }
        }
        Ok(texts)
    }

    async fn matched_selectors(&self, candidates: &[String]) -> Result<Vec<String>, PageError> {
        let mut matched = Vec::new();
        for selector in candidates {
            if self.inner.find_element(selector.as_str()).await.is_ok() {
                matched.push(selector.clone());
            }
        }
        Ok(matched)
    }

    async fn evaluate_script(&self, script: &str) -> Result<serde_json::Value, PageError> {
        let result = self
            .inner
            .evaluate(script)
            .await
            .map_err(|e| PageError::Evaluation(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| PageError::Evaluation(e.to_string()))
    }

    async fn scroll(&self, dx: i64, dy: i64) -> Result<(), PageError> {
        let script = format!("window.scrollBy({dx}, {dy})");
        self.evaluate_script(&script).await.map(|_| ())
    }

    async fn screenshot_base64(&self) -> Result<String, PageError> {
        let bytes = self
            .inner
            .screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|e| PageError::Evaluation(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    async fn snapshot(&self) -> Result<PageSnapshot, PageError> {
        let html = self.inner.content().await.map_err(|e| PageError::Evaluation(e.to_string()))?;
        let url = self.current_url().await?;
        Ok(PageSnapshot {
            url,
            html,
            status_code: None,
        })
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.inner.url().await.map_err(|e| PageError::Evaluation(e.to_string()))?.unwrap_or_default())
    }
}
