//! Job Runner : the entry point that turns a [`crate::config::JobRequest`] into a
//! running, cancellable scrape across every requested site.

pub mod page_pool;
pub mod runner;
pub mod types;

pub use runner::{JobRunner, PageFactory};
pub use types::{JobCounters, JobHandle, JobStatus, JobSummary};
