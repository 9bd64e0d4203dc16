//! Startup-time action registry (Design Notes redesign of
//! `original_source/scraper_backend/scrapers/actions/registry.py`'s decorator-based
//! `ActionRegistry.auto_discover_actions`).
//!
//! A `HashMap<&'static str, fn() -> Box<dyn Action>>` populated once by
//! `register_default_actions()`. An unknown action name is rejected when a job's site
//! configs are validated at job start (see `crate::job::runner`), not at step-execution time.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::page::Page;

use super::types::{ExecutionContext, StepOutcome};

/// A single workflow action: a typed parameter surface plus an effect on the page/context.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(
        &self,
        params: &HashMap<String, Value>,
        ctx: &ExecutionContext,
        page: &dyn Page,
    ) -> StepOutcome;
}

pub type ActionFactory = fn() -> Box<dyn Action>;

/// Action names that get wrapped in `execute_with_retry` by the workflow executor. Everything
/// else runs once.
pub const RETRYABLE_ACTIONS: &[&str] = &[
    "navigate",
    "wait_for",
    "click",
    "input_text",
    "login",
    "check_no_results",
    "detect_captcha",
];

pub fn is_retryable_action(name: &str) -> bool {
    RETRYABLE_ACTIONS.contains(&name)
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

pub struct ActionRegistry {
    factories: HashMap<&'static str, ActionFactory>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        register_default_actions()
    }
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, factory: ActionFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Action>, RegistryError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownAction(name.to_string()))
    }

    /// Rejects a workflow's action names eagerly, before any step runs, instead of failing
    /// midway through a job on an unregistered action.
    pub fn validate_steps(&self, steps: &[crate::config::WorkflowStep]) -> Result<(), RegistryError> {
        for step in steps {
            if !self.contains(&step.action) {
                return Err(RegistryError::UnknownAction(step.action.clone()));
            }
        }
        Ok(())
    }
}

pub fn register_default_actions() -> ActionRegistry {
    let mut registry = ActionRegistry::empty();
    use super::actions::control::{CheckNoResultsAction, ConditionalSkipAction, DetectCaptchaAction, ExecuteScriptAction, VerifyAction};
    use super::actions::extraction::{ExtractAction, ExtractMultipleAction, ExtractSingleAction, ParseTableAction};
    use super::actions::input::{InputTextAction, LoginAction};
    use super::actions::navigation::{ClickAction, ConditionalClickAction, NavigateAction, ScrollAction, WaitAction, WaitForAction};
    use super::actions::transform::TransformValueAction;

    registry.register("navigate", || Box::new(NavigateAction));
    registry.register("wait_for", || Box::new(WaitForAction));
    registry.register("click", || Box::new(ClickAction));
    registry.register("conditional_click", || Box::new(ConditionalClickAction));
    registry.register("scroll", || Box::new(ScrollAction));
    registry.register("wait", || Box::new(WaitAction));
    registry.register("input_text", || Box::new(InputTextAction));
    registry.register("login", || Box::new(LoginAction));
    registry.register("extract_single", || Box::new(ExtractSingleAction));
    registry.register("extract_multiple", || Box::new(ExtractMultipleAction));
    registry.register("extract", || Box::new(ExtractAction));
    registry.register("parse_table", || Box::new(ParseTableAction));
    registry.register("transform_value", || Box::new(TransformValueAction));
    registry.register("check_no_results", || Box::new(CheckNoResultsAction));
    registry.register("conditional_skip", || Box::new(ConditionalSkipAction));
    registry.register("verify", || Box::new(VerifyAction));
    registry.register("execute_script", || Box::new(ExecuteScriptAction));
    registry.register("detect_captcha", || Box::new(DetectCaptchaAction));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_every_required_action() {
        let registry = register_default_actions();
        for action in [
            "navigate", "wait_for", "click", "input_text", "login", "extract_single",
            "extract_multiple", "extract", "transform_value", "parse_table",
            "check_no_results", "conditional_skip", "verify", "execute_script", "scroll",
            "wait", "conditional_click", "detect_captcha",
        ] {
            assert!(registry.contains(action), "missing action: {action}");
        }
    }

    #[test]
    fn unknown_action_is_rejected_at_validation() {
        let registry = register_default_actions();
        let steps = vec![crate::config::WorkflowStep::new("not_a_real_action")];
        assert!(registry.validate_steps(&steps).is_err());
    }
}
