//! The structured event bus.
//!
//! Generalizes the teacher's `crawl_events::bus` (a pure `tokio::sync::broadcast` fan-out)
//! with a global ring buffer and a per-job LRU-evicted buffer so that `query()` can serve
//! historical events to late subscribers (e.g. the `GET /events` HTTP endpoint), which a bare
//! broadcast channel cannot do once a receiver lags or a subscriber connects after the fact.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use super::config::{BackpressureMode, EventBusConfig};
use super::errors::EventBusError;
use super::metrics::EventBusMetrics;
use super::types::{EventFilter, ScraperEvent};

/// Handle returned by [`EventBus::subscribe`], used to stop a callback subscription.
#[derive(Debug)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct EventBus {
    sender: broadcast::Sender<ScraperEvent>,
    config: Arc<EventBusConfig>,
    metrics: EventBusMetrics,
    ring: Mutex<VecDeque<ScraperEvent>>,
    per_job: Mutex<LruCache<String, VecDeque<ScraperEvent>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    next_sub_id: AtomicU64,
    persist_file: Option<Mutex<std::fs::File>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        let max_jobs =
            std::num::NonZeroUsize::new(config.max_jobs.max(1)).expect("max_jobs > 0");
        let persist_file = config.persist_path.as_ref().and_then(|path| {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "event bus durability file unavailable, degrading to in-memory only");
                    None
                }
            }
        });
        Self {
            sender,
            config: Arc::new(config),
            metrics: EventBusMetrics::new(),
            ring: Mutex::new(VecDeque::new()),
            per_job: Mutex::new(LruCache::new(max_jobs)),
            subscriptions: Mutex::new(Vec::new()),
            next_sub_id: AtomicU64::new(0),
            persist_file,
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EventBusMetrics {
        &self.metrics
    }

    /// Subscribe with a plain receiver. Dropping the receiver unsubscribes implicitly.
    pub fn subscribe_receiver(&self) -> broadcast::Receiver<ScraperEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a callback, spawned onto its own task. A failing callback is logged but
    /// never breaks `emit` for other subscribers.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ScraperEvent) + Send + Sync + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.subscriptions.lock().push(Subscription { id, handle });
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.lock();
        if let Some(pos) = subs.iter().position(|s| s.id == id.0) {
            let sub = subs.remove(pos);
            sub.handle.abort();
        }
    }

    /// Emit an event. Never blocks on subscribers; a slow/full subscriber channel degrades per
    /// [`BackpressureMode`] without affecting other subscribers or the ring/per-job buffers.
    pub fn emit(&self, event: ScraperEvent) -> Result<(), EventBusError> {
        self.push_ring(event.clone());
        if let Some(job_id) = event.job_id.clone() {
            self.push_job_buffer(job_id, event.clone());
        }
        self.persist(&event);

        match self.sender.send(event) {
            Ok(_) => {
                self.metrics.record_published();
            }
            Err(_no_receivers) => {
                // No active subscribers; not an error per spec (subscribers may come and go).
                self.metrics.record_published();
            }
        }
        Ok(())
    }

    fn push_ring(&self, event: ScraperEvent) {
        let mut ring = self.ring.lock();
        ring.push_back(event);
        while ring.len() > self.config.ring_buffer_size {
            ring.pop_front();
            self.metrics.record_dropped();
        }
    }

    fn push_job_buffer(&self, job_id: String, event: ScraperEvent) {
        let mut per_job = self.per_job.lock();
        let buf = per_job.get_or_insert_mut(job_id, VecDeque::new);
        buf.push_back(event);
        while buf.len() > self.config.per_job_buffer_size {
            buf.pop_front();
        }
    }

    fn persist(&self, event: &ScraperEvent) {
        let Some(file) = &self.persist_file else {
            return;
        };
        match serde_json::to_string(event) {
            Ok(line) => {
                let mut file = file.lock();
                if let Err(err) = writeln!(file, "{line}") {
                    warn!(error = %err, "event durability write failed, continuing in-memory only");
                    self.metrics.record_persist_failure();
                }
            }
            Err(err) => {
                warn!(error = %err, "event serialization failed, skipping durability write");
                self.metrics.record_persist_failure();
            }
        }
    }

    /// Query buffered events, newest-aware, respecting `limit`.
    ///
    /// When `filter.job_id` is set the per-job buffer is consulted directly (cheap, bounded by
    /// `per_job_buffer_size`); otherwise the global ring buffer is scanned.
    pub fn query(&self, filter: &EventFilter, limit: usize) -> Vec<ScraperEvent> {
        let source: Vec<ScraperEvent> = if let Some(job_id) = &filter.job_id {
            let mut per_job = self.per_job.lock();
            per_job
                .get(job_id)
                .map(|buf| buf.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            self.ring.lock().iter().cloned().collect()
        };

        source
            .into_iter()
            .filter(|event| filter.matches(event))
            .take(limit)
            .collect()
    }

    /// Drop all buffered state for a job (its per-job buffer; ring buffer entries age out
    /// naturally).
    pub fn clear(&self, job_id: &str) {
        self.per_job.lock().pop(job_id);
    }

    pub fn pressure(&self) -> f64 {
        self.sender.len() as f64 / self.config.channel_capacity.max(1) as f64
    }

    pub fn is_overloaded(&self) -> bool {
        self.pressure() >= self.config.overload_threshold
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("ring_len", &self.ring.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventType;

    #[tokio::test]
    async fn emit_preserves_per_job_order() {
        let bus = EventBus::new(EventBusConfig::default());
        for i in 0..5 {
            bus.emit(ScraperEvent::sku_processing("job1", "site", &i.to_string()))
                .unwrap();
        }
        let events = bus.query(&EventFilter { job_id: Some("job1".into()), ..Default::default() }, 100);
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.data.get("sku").unwrap().as_str().unwrap(), i.to_string());
        }
    }

    #[tokio::test]
    async fn query_filters_by_event_type() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.emit(ScraperEvent::job_started("job1", 1, 1)).unwrap();
        bus.emit(ScraperEvent::sku_processing("job1", "site", "sku")).unwrap();
        let filter = EventFilter {
            job_id: None,
            event_types: Some(vec![EventType::JobStarted]),
            since: None,
        };
        let events = bus.query(&filter, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::JobStarted);
    }

    #[tokio::test]
    async fn clear_drops_job_buffer() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.emit(ScraperEvent::job_started("job1", 1, 1)).unwrap();
        bus.clear("job1");
        let events = bus.query(&EventFilter { job_id: Some("job1".into()), ..Default::default() }, 10);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn ring_buffer_bounded() {
        let mut config = EventBusConfig::default();
        config.ring_buffer_size = 3;
        let bus = EventBus::new(config);
        for i in 0..10 {
            bus.emit(ScraperEvent::sku_processing("job1", "site", &i.to_string()))
                .unwrap();
        }
        let events = bus.query(&EventFilter::default(), 100);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn subscribe_receives_emitted_events() {
        let bus = EventBus::new(EventBusConfig::default());
        let mut rx = bus.subscribe_receiver();
        bus.emit(ScraperEvent::job_started("job1", 1, 1)).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::JobStarted);
    }
}
