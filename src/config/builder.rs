//! Type-safe builder for [`JobRequest`] using the typestate pattern, mirroring the teacher's
//! `CrawlConfigBuilder<State>` (`WithStorageDir`/`WithStartUrl`/`Complete`) generalized to this
//! domain's two required fields: a SKU set and a site set.

use std::collections::HashMap;
use std::marker::PhantomData;

use super::types::JobRequest;

pub struct WithSkus;
pub struct WithSites;
pub struct Complete;

pub struct JobRequestBuilder<State = ()> {
    skus: Vec<String>,
    site_names: Vec<String>,
    max_workers: Option<usize>,
    per_site_workers: HashMap<String, usize>,
    test_mode: bool,
    debug_mode: bool,
    _phantom: PhantomData<State>,
}

impl Default for JobRequestBuilder<()> {
    fn default() -> Self {
        Self {
            skus: Vec::new(),
            site_names: Vec::new(),
            max_workers: None,
            per_site_workers: HashMap::new(),
            test_mode: false,
            debug_mode: false,
            _phantom: PhantomData,
        }
    }
}

impl JobRequestBuilder<()> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn skus(self, skus: Vec<String>) -> JobRequestBuilder<WithSkus> {
        JobRequestBuilder {
            skus,
            site_names: self.site_names,
            max_workers: self.max_workers,
            per_site_workers: self.per_site_workers,
            test_mode: self.test_mode,
            debug_mode: self.debug_mode,
            _phantom: PhantomData,
        }
    }
}

impl JobRequestBuilder<WithSkus> {
    #[must_use]
    pub fn site_names(self, site_names: Vec<String>) -> JobRequestBuilder<Complete> {
        JobRequestBuilder {
            skus: self.skus,
            site_names,
            max_workers: self.max_workers,
            per_site_workers: self.per_site_workers,
            test_mode: self.test_mode,
            debug_mode: self.debug_mode,
            _phantom: PhantomData,
        }
    }
}

impl<State> JobRequestBuilder<State> {
    #[must_use]
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    #[must_use]
    pub fn per_site_workers(mut self, per_site_workers: HashMap<String, usize>) -> Self {
        self.per_site_workers = per_site_workers;
        self
    }

    #[must_use]
    pub fn test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    #[must_use]
    pub fn debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }
}

impl JobRequestBuilder<Complete> {
    #[must_use]
    pub fn build(self) -> JobRequest {
        JobRequest {
            skus: self.skus,
            site_names: self.site_names,
            max_workers: self.max_workers,
            per_site_workers: self.per_site_workers,
            test_mode: self.test_mode,
            debug_mode: self.debug_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_complete_request() {
        let request = JobRequestBuilder::new()
            .skus(vec!["A".into()])
            .site_names(vec!["demo".into()])
            .max_workers(4)
            .test_mode(true)
            .build();
        assert_eq!(request.skus, vec!["A".to_string()]);
        assert_eq!(request.site_names, vec!["demo".to_string()]);
        assert_eq!(request.max_workers, Some(4));
        assert!(request.test_mode);
    }
}
