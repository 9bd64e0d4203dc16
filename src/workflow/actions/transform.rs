//! Field transforms (`NormalizationRule`). Shared by the `transform_value` action and
//! by the workflow executor's post-pass normalization (responsibility 4).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::page::Page;
use crate::config::NormalizationTransform;
use crate::error::FailureKind;
use crate::results::record::normalize_weight_to_pounds;

use crate::workflow::registry::Action;
use crate::workflow::types::{ExecutionContext, StepOutcome};

/// Applies one [`NormalizationTransform`] to a string value.
pub fn apply_transform(transform: &NormalizationTransform, raw: &str) -> String {
    match transform {
        NormalizationTransform::Lower => raw.to_lowercase(),
        NormalizationTransform::Upper => raw.to_uppercase(),
        NormalizationTransform::Title => title_case(raw),
        NormalizationTransform::Trim => raw.trim().to_string(),
        NormalizationTransform::StripPrefix(prefix) => raw.strip_prefix(prefix.as_str()).unwrap_or(raw).to_string(),
        NormalizationTransform::ExtractWeight => normalize_weight_to_pounds(raw),
    }
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_transform(name: &str, arg: Option<&str>) -> Option<NormalizationTransform> {
    match name {
        "lower" => Some(NormalizationTransform::Lower),
        "upper" => Some(NormalizationTransform::Upper),
        "title" => Some(NormalizationTransform::Title),
        "trim" => Some(NormalizationTransform::Trim),
        "strip_prefix" => Some(NormalizationTransform::StripPrefix(arg.unwrap_or_default().to_string())),
        "extract_weight" => Some(NormalizationTransform::ExtractWeight),
        _ => None,
    }
}

/// Transforms a single context field in place (`params`: `field`, `transform`, optional `arg`).
pub struct TransformValueAction;

#[async_trait]
impl Action for TransformValueAction {
    async fn execute(&self, params: &HashMap<String, Value>, ctx: &ExecutionContext, _page: &dyn Page) -> StepOutcome {
        let field = match params.get("field").and_then(Value::as_str) {
            Some(f) => f.to_string(),
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `field`".to_string()),
        };
        let transform_name = match params.get("transform").and_then(Value::as_str) {
            Some(t) => t,
            None => return StepOutcome::Fail(FailureKind::ElementMissing, "missing required param `transform`".to_string()),
        };
        let arg = params.get("arg").and_then(Value::as_str);
        let transform = match parse_transform(transform_name, arg) {
            Some(t) => t,
            None => return StepOutcome::Fail(FailureKind::ElementMissing, format!("unknown transform: {transform_name}")),
        };

        let Some(current) = ctx.get_field(&field) else {
            return StepOutcome::Ok;
        };
        let Value::String(raw) = current else {
            return StepOutcome::Ok;
        };
        ctx.set_field(field, Value::String(apply_transform(&transform, &raw)));
        StepOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_weight_transform_normalizes_to_pounds() {
        assert_eq!(apply_transform(&NormalizationTransform::ExtractWeight, "16 oz"), "1.00");
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("red bull energy drink"), "Red Bull Energy Drink");
    }
}
