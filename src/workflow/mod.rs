//! Workflow execution engine : declarative per-site step sequences run against a
//! [`crate::browser::page::Page`], wrapped in retry/circuit-breaker protection for a
//! whitelisted subset of actions.

pub mod actions;
pub mod executor;
pub mod registry;
pub mod types;

pub use executor::WorkflowExecutor;
pub use registry::{Action, ActionRegistry, RETRYABLE_ACTIONS};
pub use types::{DebugArtifact, ExecutionContext, StepOutcome, WorkflowResult};
