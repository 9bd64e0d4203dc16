//! Text-input and login actions.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::page::Page;
use crate::error::FailureKind;

use crate::workflow::registry::Action;
use crate::workflow::types::{ExecutionContext, StepOutcome};

fn required_str(params: &HashMap<String, Value>, key: &str) -> Result<String, StepOutcome> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StepOutcome::Fail(FailureKind::ElementMissing, format!("missing required param `{key}`")))
}

pub struct InputTextAction;

#[async_trait]
impl Action for InputTextAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selector = match required_str(params, "selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        let text = match required_str(params, "text") {
            Ok(t) => ctx.resolve(&t),
            Err(outcome) => return outcome,
        };
        match page.input_text(&selector, &text).await {
            Ok(()) => StepOutcome::Ok,
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

/// Fills username/password from the site's `LoginConfig` and submits.
///
/// Credentials come from `LoginConfig.username`/`.password` (populated from environment at
/// config load; these fields are `#[serde(skip)]`), not from step params, so a workflow never
/// embeds a secret in its own JSON.
pub struct LoginAction;

#[async_trait]
impl Action for LoginAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let username_field = match required_str(params, "username_selector") {
            Ok(s) => s,
            Err(outcome) => return outcome,
        };
        let password_field = match required_str(params, "password_selector") {
            Ok(s) => s,
            Err(outcome) => return outcome,
        };
        let submit_selector = match required_str(params, "submit_selector") {
            Ok(s) => s,
            Err(outcome) => return outcome,
        };

        let username = match ctx.get_field("__login_username") {
            Some(Value::String(s)) => s,
            _ => return StepOutcome::Fail(FailureKind::LoginFailed, "no username configured for site".to_string()),
        };
        let password = match ctx.get_field("__login_password") {
            Some(Value::String(s)) => s,
            _ => return StepOutcome::Fail(FailureKind::LoginFailed, "no password configured for site".to_string()),
        };

        if let Err(err) = page.input_text(&username_field, &username).await {
            return StepOutcome::Fail(FailureKind::LoginFailed, err.to_string());
        }
        if let Err(err) = page.input_text(&password_field, &password).await {
            return StepOutcome::Fail(FailureKind::LoginFailed, err.to_string());
        }
        if let Err(err) = page.click(&submit_selector).await {
            return StepOutcome::Fail(FailureKind::LoginFailed, err.to_string());
        }

        if let Some(indicator) = params.get("success_indicator").and_then(Value::as_str) {
            match page.wait_for_selector(indicator, 10_000).await {
                Ok(()) => StepOutcome::Ok,
                Err(err) => StepOutcome::Fail(FailureKind::LoginFailed, err.to_string()),
            }
        } else {
            StepOutcome::Ok
        }
    }
}
