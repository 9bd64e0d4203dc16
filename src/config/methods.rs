//! Fluent `with_*` methods for [`OrchestratorConfig`], mirroring the teacher's
//! `CrawlConfig` method-set split (construction concerns kept separate from plain getters in
//! `getters.rs`).

use std::time::Duration;

use super::types::OrchestratorConfig;

impl OrchestratorConfig {
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_stagger_delay(mut self, delay: Duration) -> Self {
        self.stagger_delay = delay;
        self
    }

    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluent_methods_compose() {
        let config = OrchestratorConfig::default()
            .with_max_workers(8)
            .with_batch_size(10)
            .with_headless(false);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.batch_size, 10);
        assert!(!config.headless);
    }
}
