//! Shared types for workflow execution.
//!
//! `StepOutcome` is a redesign of the Python original's context-side `no_results_found`
//! boolean flag: steps return a sum type instead of mutating shared state, reimagining
//! `original_source/scraper_backend/scrapers/executor/workflow_executor.py`'s step-dispatch
//! loop with exception-driven control flow instead.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::FailureKind;

/// The result of executing one workflow step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Ok,
    /// Halts the remainder of the workflow cleanly; `reason` is surfaced in `WorkflowResult`
    /// but is not an error.
    Skip(String),
    Fail(FailureKind, String),
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Ok)
    }
}

/// Per-task execution context shared by every step of one SKU's workflow run.
///
/// `vars` backs `{name}`-style placeholder substitution (`WorkflowStep`); `fields`
/// accumulates named extraction/transformation results that later steps (and the post-pass
/// normalization rules) read and write.
pub struct ExecutionContext {
    pub sku: String,
    pub site: String,
    pub job_id: Option<String>,
    pub test_mode: bool,
    pub debug_mode: bool,
    vars: HashMap<String, String>,
    fields: Mutex<HashMap<String, Value>>,
}

impl ExecutionContext {
    pub fn new(site: impl Into<String>, sku: impl Into<String>, test_mode: bool, debug_mode: bool) -> Self {
        let sku = sku.into();
        let mut vars = HashMap::new();
        vars.insert("sku".to_string(), sku.clone());
        Self {
            sku,
            site: site.into(),
            job_id: None,
            test_mode,
            debug_mode,
            vars,
            fields: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Substitutes every `{name}` occurrence in `template` with a value from `vars`, falling
    /// back to a stringified entry from `fields` if no `vars` entry exists.
    pub fn resolve(&self, template: &str) -> String {
        if !template.contains('{') {
            return template.to_string();
        }
        let mut out = template.to_string();
        for (key, value) in &self.vars {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        let fields = self.fields.lock().expect("execution context fields mutex poisoned");
        for (key, value) in fields.iter() {
            let placeholder = format!("{{{key}}}");
            if out.contains(&placeholder) {
                let as_str = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&placeholder, &as_str);
            }
        }
        out
    }

    pub fn set_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields
            .lock()
            .expect("execution context fields mutex poisoned")
            .insert(key.into(), value.into());
    }

    pub fn get_field(&self, key: &str) -> Option<Value> {
        self.fields.lock().expect("execution context fields mutex poisoned").get(key).cloned()
    }

    pub fn snapshot_fields(&self) -> HashMap<String, Value> {
        self.fields.lock().expect("execution context fields mutex poisoned").clone()
    }
}

/// Outcome of `execute_workflow` (contract).
#[derive(Debug, Clone, Default)]
pub struct WorkflowResult {
    pub success: bool,
    pub results: HashMap<String, Value>,
    pub steps_executed: usize,
    pub errors: Vec<String>,
    pub no_results_found: bool,
}

/// Debug artifacts captured on step failure when debug mode is on (responsibility 5).
#[derive(Debug, Clone)]
pub struct DebugArtifact {
    pub sku: String,
    pub site: String,
    pub step_index: usize,
    pub action: String,
    pub url: String,
    pub page_content: String,
    pub screenshot_base64: Option<String>,
}
