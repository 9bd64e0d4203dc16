//! End-to-end scheduler scenarios from the specification's testable-properties section:
//! login-site serialization, per-site FIFO ordering, and global-cap serialization across
//! multiple sites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrape_orchestrator::scheduler::site_scheduler::SiteConcurrency;
use scrape_orchestrator::Orchestrator;

/// Scenario 3: a `requires_login` site never runs more than one task concurrently, and the
/// SKUs start in insertion (FIFO) order.
#[tokio::test]
async fn login_site_never_exceeds_one_concurrent_task() {
    let mut orchestrator = Orchestrator::new(4);
    orchestrator.register_site("login_site", SiteConcurrency { requires_login: true, site_max_workers: 10 });
    for sku in ["S1", "S2", "S3"] {
        orchestrator.enqueue("login_site", sku);
    }

    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));
    let start_order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let concurrent_for_closure = concurrent.clone();
    let max_for_closure = max_concurrent.clone();
    let order_for_closure = start_order.clone();

    orchestrator
        .run(move |_site, sku| {
            let concurrent = concurrent_for_closure.clone();
            let max_concurrent = max_for_closure.clone();
            let start_order = order_for_closure.clone();
            async move {
                start_order.lock().unwrap().push(sku);
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1, "login site must serialize to at most 1 in-flight task");
    assert_eq!(*start_order.lock().unwrap(), vec!["S1", "S2", "S3"], "tasks must start in enqueue order");
}

/// Invariant 2: the number of `running` tasks never exceeds `max_workers`, even with several
/// sites competing for the same global cap (`max_workers = 1` boundary case).
#[tokio::test]
async fn global_cap_of_one_serializes_across_sites() {
    let mut orchestrator = Orchestrator::new(1);
    orchestrator.register_site("a", SiteConcurrency { requires_login: false, site_max_workers: 3 });
    orchestrator.register_site("b", SiteConcurrency { requires_login: false, site_max_workers: 3 });
    for sku in ["a1", "a2"] {
        orchestrator.enqueue("a", sku);
    }
    for sku in ["b1", "b2"] {
        orchestrator.enqueue("b", sku);
    }

    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));
    let concurrent_for_closure = concurrent.clone();
    let max_for_closure = max_concurrent.clone();

    let completed = orchestrator
        .run(move |_site, _sku| {
            let concurrent = concurrent_for_closure.clone();
            let max_concurrent = max_for_closure.clone();
            async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert_eq!(completed.len(), 4);
    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1, "max_workers=1 must serialize globally across every site");
}

/// Boundary case: an empty job (no sites registered, nothing enqueued) completes with zero
/// tasks and no worker ever runs.
#[tokio::test]
async fn orchestrator_with_no_sites_completes_immediately() {
    let orchestrator = Orchestrator::new(4);
    let completed = orchestrator.run(|_site, _sku| async { Ok(()) }).await;
    assert!(completed.is_empty());
}
