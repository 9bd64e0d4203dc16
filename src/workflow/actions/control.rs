//! Control-flow and validation actions.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::browser::page::Page;
use crate::error::FailureKind;

use crate::workflow::registry::Action;
use crate::workflow::types::{ExecutionContext, StepOutcome};

/// Checks the page against `no_results_selectors`/`no_results_text_patterns`
/// (`params["selectors"]`/`params["text_patterns"]`). On a match it records
/// `no_results_found = true` on the context and halts the workflow via `StepOutcome::Skip`
/// rather than failing it — a "no results" page is a successful, empty scrape.
pub struct CheckNoResultsAction;

#[async_trait]
impl Action for CheckNoResultsAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selectors: Vec<String> = params
            .get("selectors")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let text_patterns: Vec<String> = params
            .get("text_patterns")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        if !selectors.is_empty() {
            match page.matched_selectors(&selectors).await {
                Ok(matched) if !matched.is_empty() => {
                    ctx.set_field("no_results_found", Value::Bool(true));
                    return StepOutcome::Skip("no_results_selector_matched".to_string());
                }
                Ok(_) => {}
                Err(err) => return StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
            }
        }

        if !text_patterns.is_empty() {
            let snapshot = match page.snapshot().await {
                Ok(s) => s,
                Err(err) => return StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
            };
            let lower_html = snapshot.html.to_lowercase();
            if text_patterns.iter().any(|p| lower_html.contains(&p.to_lowercase())) {
                ctx.set_field("no_results_found", Value::Bool(true));
                return StepOutcome::Skip("no_results_text_matched".to_string());
            }
        }

        StepOutcome::Ok
    }
}

/// Halts the workflow when a named context field is truthy, without marking it as a failure.
pub struct ConditionalSkipAction;

#[async_trait]
impl Action for ConditionalSkipAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, _page: &dyn Page) -> StepOutcome {
        let field = match params.get("if_field").and_then(Value::as_str) {
            Some(f) => f,
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `if_field`".to_string()),
        };
        let reason = params.get("reason").and_then(Value::as_str).unwrap_or("conditional_skip").to_string();
        let truthy = ctx.get_field(field).map(|v| v.as_bool().unwrap_or(!v.is_null())).unwrap_or(false);
        if truthy {
            StepOutcome::Skip(reason)
        } else {
            StepOutcome::Ok
        }
    }
}

/// Asserts a regex pattern matches a context field's current string value; fails the step
/// (non-retryable by default since the caller wraps only the whitelisted actions) if it doesn't.
pub struct VerifyAction;

#[async_trait]
impl Action for VerifyAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, _page: &dyn Page) -> StepOutcome {
        let field = match params.get("field").and_then(Value::as_str) {
            Some(f) => f,
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `field`".to_string()),
        };
        let pattern = match params.get("pattern").and_then(Value::as_str) {
            Some(p) => p,
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `pattern`".to_string()),
        };
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(err) => return StepOutcome::Fail(FailureKind::ElementMissing, format!("invalid pattern `{pattern}`: {err}")),
        };
        let value = ctx.get_field(field).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
        if regex.is_match(&value) {
            StepOutcome::Ok
        } else {
            StepOutcome::Fail(FailureKind::ElementMissing, format!("field `{field}` value `{value}` did not match `{pattern}`"))
        }
    }
}

/// Runs `params["script"]` and, if `params["field"]` is set, stores the script's return value.
pub struct ExecuteScriptAction;

#[async_trait]
impl Action for ExecuteScriptAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let script = match params.get("script").and_then(Value::as_str) {
            Some(s) => ctx.resolve(s),
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `script`".to_string()),
        };
        match page.evaluate_script(&script).await {
            Ok(value) => {
                if let Some(field) = params.get("field").and_then(Value::as_str) {
                    ctx.set_field(field, value);
                }
                StepOutcome::Ok
            }
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

/// Checks the page for known captcha markers. A detected captcha is a retryable adversarial
/// failure (`FailureKind::CaptchaDetected`), not a clean skip, since the retry loop
/// may recover via a recovery handler (e.g. manual solve, proxy rotation) before giving up.
pub struct DetectCaptchaAction;

const CAPTCHA_MARKERS: &[&str] = &["g-recaptcha", "h-captcha", "cf-challenge", "are you a human", "verify you are a human"];

#[async_trait]
impl Action for DetectCaptchaAction {
    async fn execute(&self, _params: &HashMap<String, Value>, _ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let snapshot = match page.snapshot().await {
            Ok(s) => s,
            Err(err) => return StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        };
        let lower_html = snapshot.html.to_lowercase();
        if CAPTCHA_MARKERS.iter().any(|marker| lower_html.contains(marker)) {
            StepOutcome::Fail(FailureKind::CaptchaDetected, "captcha marker found on page".to_string())
        } else {
            StepOutcome::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::page::fake::FakePage;

    #[tokio::test]
    async fn check_no_results_skips_on_selector_match() {
        let page = FakePage {
            present_selectors: vec!["#no-results".to_string()],
            ..Default::default()
        };
        let ctx = ExecutionContext::new("site", "sku", false, false);
        let mut params = HashMap::new();
        params.insert("selectors".to_string(), serde_json::json!(["#no-results"]));
        let outcome = CheckNoResultsAction.execute(&params, &ctx, &page).await;
        assert!(matches!(outcome, StepOutcome::Skip(_)));
        assert_eq!(ctx.get_field("no_results_found"), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn detect_captcha_fails_on_marker() {
        let page = FakePage {
            html: "<div class=\"g-recaptcha\"></div>".to_string(),
            ..Default::default()
        };
        let ctx = ExecutionContext::new("site", "sku", false, false);
        let outcome = DetectCaptchaAction.execute(&HashMap::new(), &ctx, &page).await;
        assert!(matches!(outcome, StepOutcome::Fail(FailureKind::CaptchaDetected, _)));
    }
}
