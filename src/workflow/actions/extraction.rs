//! Data-extraction actions . Extracted values are written into the execution
//! context under `params["field"]`; the workflow executor harvests `ctx.snapshot_fields()`
//! into `WorkflowResult.results` once the workflow finishes.

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

/// Extracts either a selector's text or a named attribute, storing the result under `field`.
/// A missing element is not a failure unless `required` is set, mirroring `SelectorConfig.required`.
pub struct ExtractSingleAction;

#[async_trait]
impl Action for ExtractSingleAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selector = match required_str(params, "selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        let field = match required_str(params, "field") {
            Ok(f) => f,
            Err(outcome) => return outcome,
        };
        let required = params.get("required").and_then(Value::as_bool).unwrap_or(false);

        let value = match params.get("attribute").and_then(Value::as_str) {
            Some(attr) => page.extract_attribute(&selector, attr).await,
            None => page.extract_text(&selector).await,
        };

        match value {
            Ok(Some(text)) => {
                ctx.set_field(field, Value::String(text));
                StepOutcome::Ok
            }
            Ok(None) if required => {
                StepOutcome::Fail(FailureKind::ElementMissing, format!("required field `{field}` not found at {selector}"))
            }
            Ok(None) => StepOutcome::Ok,
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

pub struct ExtractMultipleAction;

#[async_trait]
impl Action for ExtractMultipleAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selector = match required_str(params, "selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        let field = match required_str(params, "field") {
            Ok(f) => f,
            Err(outcome) => return outcome,
        };
        match page.extract_multiple_text(&selector).await {
            Ok(values) => {
                ctx.set_field(field, Value::Array(values.into_iter().map(Value::String).collect()));
                StepOutcome::Ok
            }
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}

/// Generic extraction over a `SelectorConfig` list supplied as `params["selectors"]`: each
/// entry is `{id, selector, attribute?, multiple?, required?}`, extracted into its `id` field.
pub struct ExtractAction;

#[async_trait]
impl Action for ExtractAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let selectors = match params.get("selectors").and_then(Value::as_array) {
            Some(s) => s,
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `selectors`".to_string()),
        };

        for entry in selectors {
            let Some(id) = entry.get("id").and_then(Value::as_str) else { continue };
            let Some(selector) = entry.get("selector").and_then(Value::as_str) else { continue };
            let selector = ctx.resolve(selector);
            let required = entry.get("required").and_then(Value::as_bool).unwrap_or(false);
            let multiple = entry.get("multiple").and_then(Value::as_bool).unwrap_or(false);

            if multiple {
                match page.extract_multiple_text(&selector).await {
                    Ok(values) => ctx.set_field(id, Value::Array(values.into_iter().map(Value::String).collect())),
                    Err(err) if required => return StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
                    Err(_) => {}
                }
                continue;
            }

            let value = match entry.get("attribute").and_then(Value::as_str) {
                Some(attr) => page.extract_attribute(&selector, attr).await,
                None => page.extract_text(&selector).await,
            };
            match value {
                Ok(Some(text)) => ctx.set_field(id, Value::String(text)),
                Ok(None) if required => {
                    return StepOutcome::Fail(FailureKind::ElementMissing, format!("required field `{id}` not found at {selector}"))
                }
                Ok(None) => {}
                Err(err) => return StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
            }
        }
        StepOutcome::Ok
    }
}

/// Parses a row/column table by zipping a row-selector's matches with a set of per-column
/// selectors scoped under each row (the column selectors are relative text queries evaluated
/// as `matched_selectors`-style lookups against the page since rows are not separately
/// addressable through the `Page` trait's flat selector surface).
pub struct ParseTableAction;

#[async_trait]
impl Action for ParseTableAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, page: &dyn Page) -> StepOutcome {
        let row_selector = match required_str(params, "row_selector") {
            Ok(s) => ctx.resolve(&s),
            Err(outcome) => return outcome,
        };
        let field = match required_str(params, "field") {
            Ok(f) => f,
            Err(outcome) => return outcome,
        };

        match page.extract_multiple_text(&row_selector).await {
            Ok(rows) => {
                let parsed: Vec<Value> = rows
                    .into_iter()
                    .map(|row| {
                        let mut parts = row.splitn(2, ':');
                        let key = parts.next().unwrap_or_default().trim().to_string();
                        let value = parts.next().unwrap_or_default().trim().to_string();
                        serde_json::json!({ "key": key, "value": value })
                    })
                    .collect();
                ctx.set_field(field, Value::Array(parsed));
                StepOutcome::Ok
            }
            Err(err) => StepOutcome::Fail(FailureKind::ElementMissing, err.to_string()),
        }
    }
}
