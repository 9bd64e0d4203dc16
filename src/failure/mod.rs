//! Failure classification : maps exceptions and page content to a closed set of
//! failure kinds with a confidence score.

pub mod classifier;

pub use classifier::{FailureClassifier, FailureContext, PageContext};
