//! Navigation and interaction actions (action catalogue).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::page::Page;
use crate::error::FailureKind;

use crate::workflow::registry::Action;
use crate::workflow::types::{ExecutionContext, StepOutcome};

fn param_str<'a>(params: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn required_str(params: &HashMap<String, Value>, key: &str) -> Result<String, StepOutcome> {
    param_str(params, key)
        .map(str::to_string)
        .ok_or_else(|| StepOutcome::Fail(FailureKind::ElementMissing, format!("missing required param `{key}`")))
}

pub struct NavigateAction;

#[async_trait]
impl Action for NavigateAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let url = match required_str(params, "url") {
            Ok(u) => ctx.resolve(&u),
            Err(outcome) => return outcome,
        };
        match page.navigate(&url).await {
            Ok(()) => StepOutcome::Ok,
            Err(err) => StepOutcome::Fail(FailureKind::NetworkError, err.to_string()),
        }
    }
}

pub struct WaitForAction;

#[async_trait]
impl Action for WaitForAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selector = match required_str(params, "selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        let timeout_ms = params.get("timeout_ms").and_then(Value::as_u64).unwrap_or(10_000);
        match page.wait_for_selector(&selector, Duration::from_millis(timeout_ms)).await {
            Ok(true) => StepOutcome::Ok,
            Ok(false) => StepOutcome::Fail(FailureKind::ElementMissing, format!("selector not found: {selector}")),
            Err(err) => StepOutcome::Fail(FailureKind::Timeout, err.to_string()),
        }
    }
}

pub struct ClickAction;

#[async_trait]
impl Action for ClickAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selector = match required_str(params, "selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        match page.click(&selector).await {
            Ok(()) => StepOutcome::Ok,
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

/// Clicks only when the named context field is truthy; a missing or falsy field is not a
/// failure, it just skips the click.
pub struct ConditionalClickAction;

#[async_trait]
impl Action for ConditionalClickAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let flag_field = match required_str(params, "if_field") {
            Ok(s) => s,
            Err(outcome) => return outcome,
        };
        let should_click = ctx
            .get_field(&flag_field)
            .map(|v| v.as_bool().unwrap_or(!v.is_null()))
            .unwrap_or(false);
        if !should_click {
            return StepOutcome::Ok;
        }
        let selector = match required_str(params, "selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        match page.click(&selector).await {
            Ok(()) => StepOutcome::Ok,
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

pub struct ScrollAction;

#[async_trait]
impl Action for ScrollAction {
    async fn execute(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let dy = params.get("dy").and_then(Value::as_i64).unwrap_or(800);
        match page.scroll(0, dy).await {
            Ok(()) => StepOutcome::Ok,
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

pub struct WaitAction;

#[async_trait]
impl Action for WaitAction {
    async fn execute(&self, params: &HashMap<String, Value>, _ctx: &ExecutionContext, _page: &dyn Page) -> StepOutcome {
        let ms = params.get("duration_ms").and_then(Value::as_u64).unwrap_or(1000);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        StepOutcome::Ok
    }
}
