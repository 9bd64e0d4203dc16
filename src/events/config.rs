//! Configuration for the event bus (adapted from the teacher's `crawl_events::config`).

/// Strategy for handling subscriber channel saturation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureMode {
    /// Drop oldest events when a subscriber's channel is full. Publishers never block.
    #[default]
    DropOldest,
    /// Block the publisher until space is available. Can stall `emit` if a subscriber never
    /// drains; use only for trusted, fast subscribers.
    Block,
    /// Return an error to the publisher instead of blocking or dropping.
    Error,
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel used for live subscriber fan-out.
    pub channel_capacity: usize,
    /// Size of the global ring buffer retained for `query()` (default 1000).
    pub ring_buffer_size: usize,
    /// Size of each per-job buffer (default 500).
    pub per_job_buffer_size: usize,
    /// Maximum number of distinct jobs retained before LRU eviction (default 100).
    pub max_jobs: usize,
    pub backpressure_mode: BackpressureMode,
    pub overload_threshold: f64,
    /// Optional JSON-lines file path for durable event persistence.
    pub persist_path: Option<std::path::PathBuf>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            ring_buffer_size: 1000,
            per_job_buffer_size: 500,
            max_jobs: 100,
            backpressure_mode: BackpressureMode::default(),
            overload_threshold: 0.8,
            persist_path: None,
        }
    }
}
