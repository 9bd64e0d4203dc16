//! Two-level concurrency scheduling: global cap + per-site FIFO queues.

pub mod orchestrator;
pub mod site_scheduler;

pub use orchestrator::Orchestrator;
pub use site_scheduler::{ScheduledTask, SiteConcurrency, SiteScheduler, SiteStats, TaskStatus};
