//! Event bus error type (adapted from the teacher's `crawl_events::errors`).

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event channel is full and backpressure mode is Error")]
    ChannelFull,

    #[error("failed to persist event to durability file: {0}")]
    PersistFailed(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
