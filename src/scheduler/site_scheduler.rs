//! Per-site FIFO queue + two-level semaphore worker pool.
//!
//! Ported from `original_source/scraper_backend/core/scheduler.py`'s `SiteScheduler`, replacing
//! `asyncio.Queue`/`asyncio.Semaphore`/`asyncio.Event` with their `tokio` equivalents. The
//! teacher's `crawl_engine::domain_limiter` establishes the same "acquire global, then acquire
//! per-domain" ordering this module follows, generalized here to an explicit FIFO queue plus a
//! task status state machine instead of the teacher's bare concurrency gate.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Waiting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task_id: Uuid,
    pub site: String,
    pub sku: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
}

impl ScheduledTask {
    fn new(site: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            site: site.into(),
            sku: sku.into(),
            status: TaskStatus::Queued,
            error: None,
            created_at: Instant::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn queue_time(&self) -> Option<Duration> {
        self.started_at.map(|s| s.duration_since(self.created_at))
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(c)) => Some(c.duration_since(s)),
            _ => None,
        }
    }
}

/// Per-site concurrency configuration (`SiteConfig` excerpt).
#[derive(Debug, Clone, Copy)]
pub struct SiteConcurrency {
    pub requires_login: bool,
    pub site_max_workers: usize,
}

impl SiteConcurrency {
    /// `1` if login is required, else `min(site_max_workers, global_max)`.
    pub fn effective_max_workers(&self, global_max: usize) -> usize {
        if self.requires_login {
            1
        } else {
            self.site_max_workers.min(global_max).max(1)
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SiteStats {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_submitted: usize,
}

/// A single site's FIFO work queue, run by `effective_max_workers` cooperating workers.
pub struct SiteScheduler {
    site_name: String,
    concurrency: SiteConcurrency,
    num_workers: usize,
    global_semaphore: Arc<Semaphore>,
    site_semaphore: Arc<Semaphore>,
    queue: Mutex<VecDeque<ScheduledTask>>,
    outstanding: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    total_submitted: AtomicUsize,
    shutdown: Arc<AtomicBool>,
    completed_tasks: Mutex<Vec<ScheduledTask>>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

impl SiteScheduler {
    pub fn new(site_name: impl Into<String>, concurrency: SiteConcurrency, global_semaphore: Arc<Semaphore>, global_max: usize) -> Self {
        let num_workers = concurrency.effective_max_workers(global_max);
        let site_name = site_name.into();
        info!(site = %site_name, num_workers, requires_login = concurrency.requires_login, "site scheduler initialized");
        Self {
            site_name,
            concurrency,
            num_workers,
            global_semaphore,
            site_semaphore: Arc::new(Semaphore::new(num_workers)),
            queue: Mutex::new(VecDeque::new()),
            outstanding: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            shutdown: Arc::new(AtomicBool::new(false)),
            completed_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn enqueue(&self, sku: impl Into<String>) -> ScheduledTask {
        let task = ScheduledTask::new(self.site_name.clone(), sku);
        self.queue.lock().push_back(task.clone());
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.total_submitted.fetch_add(1, Ordering::SeqCst);
        debug!(site = %self.site_name, sku = %task.sku, task_id = %task.task_id, "task queued");
        task
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run `effective_max_workers` workers against the queue until it drains (or shutdown is
    /// signalled), invoking `scraper_fn(site, sku)` for each task. Both the global and this
    /// site's semaphore are acquired (global first) before a task is allowed to run.
    pub async fn run<F, Fut>(&self, scraper_fn: F) -> Vec<ScheduledTask>
    where
        F: Fn(String, String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        self.shutdown.store(false, Ordering::SeqCst);

        let mut workers = Vec::new();
        for worker_id in 0..self.num_workers {
            let fut = self.worker_loop(worker_id, &scraper_fn);
            workers.push(fut);
        }
        futures::future::join_all(workers).await;

        self.completed_tasks.lock().clone()
    }

    async fn worker_loop<F, Fut>(&self, worker_id: usize, scraper_fn: &F)
    where
        F: Fn(String, String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let task = self.queue.lock().pop_front();
            let Some(mut task) = task else {
                if self.outstanding.load(Ordering::SeqCst) == 0 {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            };

            task.status = TaskStatus::Waiting;

            let global_permit = self.global_semaphore.clone().acquire_owned().await;
            let site_permit = self.site_semaphore.clone().acquire_owned().await;
            let (Ok(_global_permit), Ok(_site_permit)) = (global_permit, site_permit) else {
                task.status = TaskStatus::Cancelled;
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                self.finish(task);
                continue;
            };

            self.active.fetch_add(1, Ordering::SeqCst);
            task.status = TaskStatus::Running;
            task.started_at = Some(Instant::now());

            debug!(site = %self.site_name, worker_id, sku = %task.sku, "task started");

            match scraper_fn(self.site_name.clone(), task.sku.clone()).await {
                Ok(()) => {
                    task.status = TaskStatus::Completed;
                    self.completed.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    warn!(site = %self.site_name, sku = %task.sku, error = %err, "task failed");
                    task.error = Some(err);
                    task.status = TaskStatus::Failed;
                    self.failed.fetch_add(1, Ordering::SeqCst);
                }
            }
            task.completed_at = Some(Instant::now());
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finish(task);
        }
    }

    fn finish(&self, task: ScheduledTask) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.completed_tasks.lock().push(task);
    }

    pub fn stats(&self) -> SiteStats {
        SiteStats {
            queued: self.queue.lock().len(),
            active: self.active.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            total_submitted: self.total_submitted.load(Ordering::SeqCst),
        }
    }

    pub fn concurrency(&self) -> SiteConcurrency {
        self.concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn processes_all_queued_tasks() {
        let global = Arc::new(Semaphore::new(4));
        let scheduler = SiteScheduler::new(
            "site-a",
            SiteConcurrency { requires_login: false, site_max_workers: 2 },
            global,
            4,
        );
        for i in 0..5 {
            scheduler.enqueue(format!("sku-{i}"));
        }
        let processed = Arc::new(AtomicU32::new(0));
        let processed_clone = processed.clone();
        let completed = scheduler
            .run(move |_site, _sku| {
                let processed = processed_clone.clone();
                async move {
                    processed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert_eq!(completed.len(), 5);
        assert_eq!(processed.load(Ordering::SeqCst), 5);
        assert!(completed.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn login_site_is_capped_at_one_worker() {
        let global = Arc::new(Semaphore::new(4));
        let scheduler = SiteScheduler::new(
            "login-site",
            SiteConcurrency { requires_login: true, site_max_workers: 5 },
            global,
            4,
        );
        assert_eq!(scheduler.num_workers(), 1);
    }

    #[tokio::test]
    async fn failed_task_is_recorded_as_failed() {
        let global = Arc::new(Semaphore::new(1));
        let scheduler = SiteScheduler::new(
            "site-b",
            SiteConcurrency { requires_login: false, site_max_workers: 1 },
            global,
            1,
        );
        scheduler.enqueue("bad-sku");
        let completed = scheduler.run(|_site, _sku| async { Err("boom".to_string()) }).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, TaskStatus::Failed);
        assert_eq!(completed[0].error.as_deref(), Some("boom"));
    }
}
