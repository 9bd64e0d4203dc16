//! Declarative failure classification.
//!
//! The pattern table below is ported verbatim from
//! `original_source/scraper_backend/core/failure_classifier.py`. The page-content evaluation
//! path (selectors/text/status with tie-breaking) is implemented fresh, since the Python
//! original's equivalent (`classify_page_content`) is a mid-migration stub that never reached
//! its Playwright port.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::FailureKind;

/// Result of a classification pass.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub kind: FailureKind,
    pub confidence: f64,
    pub details: HashMap<String, Value>,
    pub recovery_strategy: &'static str,
}

impl FailureContext {
    fn new(kind: FailureKind, confidence: f64, recovery_strategy: &'static str) -> Self {
        Self {
            kind,
            confidence,
            details: HashMap::new(),
            recovery_strategy,
        }
    }

    fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Page state handed to `classify_page_content`.
///
/// `matched_selectors` and `page_text` are produced by the browser substrate (spec's
/// out-of-scope external collaborator); the classifier only reasons about the already-queried
/// results, never the DOM directly.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// CSS/XPath selectors from `failure_patterns` (or site-specific config) that matched.
    pub matched_selectors: Vec<String>,
    pub page_text: String,
    pub status_code: Option<u16>,
}

struct PatternEntry {
    kind: FailureKind,
    selectors: Vec<&'static str>,
    text_patterns: Vec<Regex>,
    recovery_strategy: &'static str,
}

pub struct FailureClassifier {
    patterns: Vec<PatternEntry>,
    site_no_results_selectors: Vec<String>,
    site_no_results_patterns: Vec<Regex>,
}

const MIN_TEXT_CONFIDENCE: f64 = 0.5;
const TEXT_MATCH_CONFIDENCE: f64 = 0.7;

impl FailureClassifier {
    pub fn new(
        site_no_results_selectors: Vec<String>,
        site_no_results_text_patterns: Vec<String>,
    ) -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| {
                    regex::RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .ok()
                })
                .collect()
        };

        let patterns = vec![
            PatternEntry {
                kind: FailureKind::NoResults,
                selectors: vec![
                    "[class*='no-results']",
                    "[id*='no-results']",
                    "[class*='empty']",
                    "[id*='empty']",
                    ".no-products",
                    "#no-products",
                    ".product-not-found",
                ],
                text_patterns: compile(&[
                    r"no (results?|products?|items?) found",
                    r"your search.*returned no results",
                    r"no matching products",
                    r"product not found",
                    r"item not available",
                    r"page you requested cannot be found",
                ]),
                recovery_strategy: "fail_and_continue_to_next_sku",
            },
            PatternEntry {
                kind: FailureKind::LoginFailed,
                selectors: vec![
                    "[class*='login-error']",
                    "[id*='login-error']",
                    "[class*='auth-error']",
                    ".login-failed",
                    "#login-failed",
                ],
                text_patterns: compile(&[
                    r"(login|authentication).*(failed|error|invalid)",
                    r"incorrect.*(username|password|credentials)",
                    r"unauthorized",
                ]),
                recovery_strategy: "relogin",
            },
            PatternEntry {
                kind: FailureKind::CaptchaDetected,
                selectors: vec![
                    "[class*='captcha']",
                    "[id*='captcha']",
                    "[class*='recaptcha']",
                    ".g-recaptcha",
                    "#captcha-container",
                ],
                text_patterns: compile(&[
                    r"captcha",
                    r"verify.*human",
                    r"robot.*verification",
                    r"security.*check",
                ]),
                recovery_strategy: "solve_captcha",
            },
            PatternEntry {
                kind: FailureKind::RateLimited,
                selectors: vec![
                    "[class*='rate-limit']",
                    "[id*='rate-limit']",
                    "[class*='throttle']",
                ],
                text_patterns: compile(&[
                    r"rate limit",
                    r"too many requests",
                    r"throttl",
                    r"please wait",
                    r"temporary.*block",
                ]),
                recovery_strategy: "wait_and_retry",
            },
            PatternEntry {
                kind: FailureKind::PageNotFound,
                selectors: vec!["[class*='404']", "[id*='404']", "[class*='not-found']"],
                text_patterns: compile(&[r"404", r"page not found", r"doesn't exist"]),
                recovery_strategy: "skip_and_continue",
            },
            PatternEntry {
                kind: FailureKind::AccessDenied,
                selectors: vec![
                    "[class*='access-denied']",
                    "[id*='access-denied']",
                    "[class*='forbidden']",
                    "[class*='blocked']",
                ],
                text_patterns: compile(&[r"access denied", r"forbidden", r"blocked", r"banned", r"403"]),
                recovery_strategy: "rotate_session",
            },
            PatternEntry {
                kind: FailureKind::NetworkError,
                selectors: vec![],
                text_patterns: compile(&[
                    r"connection.*(failed|error|timeout|reset)",
                    r"network.*error",
                    r"server.*error",
                    r"err_connection_refused",
                    r"dns_probe_finished_nxdomain",
                ]),
                recovery_strategy: "retry",
            },
            PatternEntry {
                kind: FailureKind::ElementMissing,
                selectors: vec![],
                text_patterns: vec![],
                recovery_strategy: "retry_with_wait",
            },
            PatternEntry {
                kind: FailureKind::Timeout,
                selectors: vec![],
                text_patterns: compile(&[r"timeout", r"timed out", r"waiting.*failed"]),
                recovery_strategy: "retry_with_backoff",
            },
        ];

        let site_no_results_patterns = site_no_results_text_patterns
            .iter()
            .filter_map(|p| regex::RegexBuilder::new(p).case_insensitive(true).build().ok())
            .collect();

        Self {
            patterns,
            site_no_results_selectors,
            site_no_results_patterns,
        }
    }

    fn entry(&self, kind: FailureKind) -> &PatternEntry {
        self.patterns
            .iter()
            .find(|e| e.kind == kind)
            .expect("all FailureKind variants have a pattern entry")
    }

    /// Classify a failure from an exception message and its type name (step 1-4 of §4.2).
    pub fn classify_exception(&self, exception_type: &str, message: &str, action: Option<&str>) -> FailureContext {
        let lower = message.to_lowercase();

        if exception_type.contains("Timeout") || lower.contains("timeout") {
            let waited_for_element = action == Some("wait_for");
            return FailureContext::new(FailureKind::Timeout, 0.9, self.entry(FailureKind::Timeout).recovery_strategy)
                .with_detail("exception_type", exception_type)
                .with_detail("waited_for_element_timeout", waited_for_element);
        }

        if lower.contains("element") && (lower.contains("not found") || lower.contains("unable to find")) {
            return FailureContext::new(
                FailureKind::ElementMissing,
                0.8,
                self.entry(FailureKind::ElementMissing).recovery_strategy,
            )
            .with_detail("exception_type", exception_type);
        }

        if ["connection", "network", "econn", "target closed"]
            .iter()
            .any(|term| lower.contains(term))
        {
            return FailureContext::new(
                FailureKind::NetworkError,
                0.8,
                self.entry(FailureKind::NetworkError).recovery_strategy,
            )
            .with_detail("exception_type", exception_type);
        }

        for entry in &self.patterns {
            if matches!(entry.kind, FailureKind::ElementMissing | FailureKind::NetworkError) {
                continue;
            }
            if entry.text_patterns.iter().any(|re| re.is_match(&lower)) {
                let confidence = TEXT_MATCH_CONFIDENCE;
                if confidence > MIN_TEXT_CONFIDENCE {
                    return FailureContext::new(entry.kind, confidence, entry.recovery_strategy)
                        .with_detail("exception_type", exception_type);
                }
            }
        }

        FailureContext::new(
            FailureKind::NetworkError,
            0.3,
            self.entry(FailureKind::NetworkError).recovery_strategy,
        )
        .with_detail("exception_type", exception_type)
        .with_detail("unknown_exception", true)
    }

    /// Classify a failure from observed page content: selectors matched, visible text, and an
    /// optional HTTP status code. Selector beats text beats status; highest confidence wins;
    /// ties break by declaration order.
    pub fn classify_page_content(&self, page: &PageContext) -> FailureContext {
        // Candidates are bucketed by category (selector > text > status) rather than pooled
        // together, so a high-confidence status match (e.g. 404 at 0.95) never outranks a
        // lower-confidence selector match (0.9): the first non-empty category, in priority
        // order, wins outright; only within a category does confidence (then declaration
        // order) decide.
        let mut selector_candidates = Vec::new();
        let mut text_candidates = Vec::new();

        // Site-specific "no results" selectors/text take priority within the NoResults kind,
        // matching the highest declared confidence for that kind.
        if page
            .matched_selectors
            .iter()
            .any(|s| self.site_no_results_selectors.contains(s))
        {
            selector_candidates.push(
                FailureContext::new(FailureKind::NoResults, 0.95, "fail_and_continue_to_next_sku")
                    .with_detail("matched", "site_specific_selector"),
            );
        }
        if self
            .site_no_results_patterns
            .iter()
            .any(|re| re.is_match(&page.page_text))
        {
            text_candidates.push(
                FailureContext::new(FailureKind::NoResults, 0.85, "fail_and_continue_to_next_sku")
                    .with_detail("matched", "site_specific_text"),
            );
        }

        for entry in &self.patterns {
            if entry
                .selectors
                .iter()
                .any(|sel| page.matched_selectors.iter().any(|m| m == sel))
            {
                selector_candidates.push(
                    FailureContext::new(entry.kind, 0.9, entry.recovery_strategy)
                        .with_detail("matched", "selector"),
                );
            }
        }

        let lower_text = page.page_text.to_lowercase();
        for entry in &self.patterns {
            if entry.text_patterns.iter().any(|re| re.is_match(&lower_text)) {
                text_candidates.push(
                    FailureContext::new(entry.kind, TEXT_MATCH_CONFIDENCE, entry.recovery_strategy)
                        .with_detail("matched", "text"),
                );
            }
        }

        let status_candidates: Vec<FailureContext> = page
            .status_code
            .and_then(|status| self.classify_status(status))
            .into_iter()
            .collect();

        Self::pick_best(selector_candidates)
            .or_else(|| Self::pick_best(text_candidates))
            .or_else(|| Self::pick_best(status_candidates))
            .unwrap_or_else(|| {
                FailureContext::new(FailureKind::NetworkError, 0.1, "retry")
                    .with_detail("no_clear_failure_detected", true)
            })
    }

    /// Highest-confidence candidate within a single category; ties keep the first considered
    /// (declaration order).
    fn pick_best(candidates: Vec<FailureContext>) -> Option<FailureContext> {
        let mut best: Option<FailureContext> = None;
        for candidate in candidates {
            let better = match &best {
                None => true,
                Some(current) => candidate.confidence > current.confidence,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }

    fn classify_status(&self, status: u16) -> Option<FailureContext> {
        let (kind, confidence) = match status {
            404 => (FailureKind::PageNotFound, 0.95),
            403 | 401 => (FailureKind::AccessDenied, 0.95),
            429 => (FailureKind::RateLimited, 0.95),
            500..=599 => (FailureKind::NetworkError, 0.95),
            _ => return None,
        };
        Some(
            FailureContext::new(kind, confidence, self.entry(kind).recovery_strategy)
                .with_detail("matched", "status")
                .with_detail("status_code", status as i64),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FailureClassifier {
        FailureClassifier::new(vec![], vec![])
    }

    #[test]
    fn timeout_exception_wins_highest_priority() {
        let ctx = classifier().classify_exception("TimeoutError", "operation timed out", Some("wait_for"));
        assert_eq!(ctx.kind, FailureKind::Timeout);
        assert_eq!(ctx.confidence, 0.9);
    }

    #[test]
    fn unknown_exception_defaults_to_network_error() {
        let ctx = classifier().classify_exception("WeirdError", "something bizarre happened", None);
        assert_eq!(ctx.kind, FailureKind::NetworkError);
        assert_eq!(ctx.confidence, 0.3);
    }

    #[test]
    fn status_code_maps_to_page_not_found() {
        let page = PageContext {
            status_code: Some(404),
            ..Default::default()
        };
        let ctx = classifier().classify_page_content(&page);
        assert_eq!(ctx.kind, FailureKind::PageNotFound);
        assert_eq!(ctx.confidence, 0.95);
    }

    #[test]
    fn selector_match_beats_status_match() {
        let page = PageContext {
            matched_selectors: vec!["[class*='captcha']".to_string()],
            status_code: Some(404),
            ..Default::default()
        };
        let ctx = classifier().classify_page_content(&page);
        assert_eq!(ctx.kind, FailureKind::CaptchaDetected);
    }

    #[test]
    fn no_input_defaults_low_confidence_network_error() {
        let ctx = classifier().classify_page_content(&PageContext::default());
        assert_eq!(ctx.kind, FailureKind::NetworkError);
        assert_eq!(ctx.confidence, 0.1);
    }

    #[test]
    fn site_specific_no_results_selector_outranks_generic_selector_match() {
        let site_classifier = FailureClassifier::new(vec![".custom-empty-state".to_string()], vec![]);
        let page = PageContext {
            matched_selectors: vec![".custom-empty-state".to_string(), "[class*='captcha']".to_string()],
            ..Default::default()
        };
        let ctx = site_classifier.classify_page_content(&page);
        assert_eq!(ctx.kind, FailureKind::NoResults, "0.95 site-specific selector confidence must beat 0.9 generic selector confidence");
        assert_eq!(ctx.details.get("matched").and_then(|v| v.as_str()), Some("site_specific_selector"));
    }

    #[test]
    fn equal_confidence_candidates_keep_the_first_considered() {
        // "captcha" and "rate limit" text patterns are both generic 0.7-confidence text matches;
        // captcha is declared first in the pattern table, so it wins the tie.
        let page = PageContext {
            page_text: "please complete the captcha, rate limit exceeded".to_string(),
            ..Default::default()
        };
        let ctx = classifier().classify_page_content(&page);
        assert_eq!(ctx.kind, FailureKind::CaptchaDetected);
    }
}
