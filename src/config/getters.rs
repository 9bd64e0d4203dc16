//! Plain accessor methods for [`OrchestratorConfig`] and [`SiteConfig`].

use std::time::Duration;

use super::types::{OrchestratorConfig, SiteConfig};

impl OrchestratorConfig {
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn stagger_delay(&self) -> Duration {
        self.stagger_delay
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn per_site_worker_override(&self, site: &str) -> Option<usize> {
        self.per_site_workers.get(site).copied()
    }
}

impl SiteConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_site_override_falls_back_to_none() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.per_site_worker_override("missing"), None);
    }
}
