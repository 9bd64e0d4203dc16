//! Per-site browser pool with a start barrier, stagger, and batch-restart cadence. Browsers
//! are not shared across workers.
//!
//! Grounded in the teacher's `browser_pool::BrowserPool`/`PooledBrowserGuard` reuse-with-cap
//! idiom, generalized from a single global pool to one pool per site sized to that site's
//! effective worker count, with pages handed out through a channel instead of a semaphore
//! guard since the job runner already gates concurrency through `SiteScheduler`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Barrier};
use tracing::info;

use crate::browser::page::Page;

/// Produces fresh [`Page`] instances. Implemented for real Chrome via `ChromiumPage` and for
/// tests via a fake that hands out canned pages.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn create_page(&self) -> anyhow::Result<Box<dyn Page>>;
}

struct PooledPage {
    page: Box<dyn Page>,
    uses: u32,
}

/// One site's pool of `num_workers` browsers, each recycled every `batch_size` uses.
pub struct PagePool {
    sender: mpsc::Sender<PooledPage>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<PooledPage>>,
    provider: Arc<dyn PageProvider>,
    batch_size: u32,
}

impl PagePool {
    /// Initializes `num_workers` browsers, synchronizing all of them on `barrier` before the
    /// pool becomes usable, then applying a `stagger_delay * worker_index` spacing so
    /// navigation doesn't start in a single burst.
    pub async fn start(
        site_name: &str,
        provider: Arc<dyn PageProvider>,
        num_workers: usize,
        batch_size: u32,
        barrier: Arc<Barrier>,
        stagger_delay: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel(num_workers.max(1));

        let mut inits = Vec::new();
        for worker_index in 0..num_workers {
            let provider = provider.clone();
            let barrier = barrier.clone();
            let sender = sender.clone();
            let site_name = site_name.to_string();
            inits.push(tokio::spawn(async move {
                let page = provider.create_page().await?;
                barrier.wait().await;
                tokio::time::sleep(stagger_delay * worker_index as u32).await;
                info!(site = %site_name, worker_index, "browser ready");
                let _ = sender.send(PooledPage { page, uses: 0 }).await;
                Ok::<(), anyhow::Error>(())
            }));
        }
        for init in inits {
            init.await??;
        }

        Ok(Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            provider,
            batch_size: batch_size.max(1),
        })
    }

    /// Borrows a page, runs `f` against it, and returns it to the pool (recycled if it has hit
    /// `batch_size` uses).
    pub async fn with_page<F, Fut, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&dyn Page) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let mut pooled = self
            .receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("page pool closed"))?;

        let result = f(pooled.page.as_ref()).await;
        pooled.uses += 1;

        if pooled.uses >= self.batch_size {
            info!(uses = pooled.uses, "recycling browser after batch limit");
            pooled.page = self.provider.create_page().await?;
            pooled.uses = 0;
        }

        let _ = self.sender.send(pooled).await;
        Ok(result)
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use crate::browser::page::fake::FakePage;

    pub struct FakePageProvider;

    #[async_trait]
    impl PageProvider for FakePageProvider {
        async fn create_page(&self) -> anyhow::Result<Box<dyn Page>> {
            Ok(Box::new(FakePage::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::FakePageProvider;

    #[tokio::test]
    async fn pool_round_trips_a_page() {
        let barrier = Arc::new(Barrier::new(1));
        let pool = PagePool::start("site", Arc::new(FakePageProvider), 1, 20, barrier, std::time::Duration::from_millis(0))
            .await
            .unwrap();
        let url = pool.with_page(|page| async move { page.current_url().await.unwrap() }).await.unwrap();
        assert_eq!(url, "");
    }

    #[tokio::test]
    async fn recycles_after_batch_limit() {
        let barrier = Arc::new(Barrier::new(1));
        let pool = PagePool::start("site", Arc::new(FakePageProvider), 1, 2, barrier, std::time::Duration::from_millis(0))
            .await
            .unwrap();
        for _ in 0..3 {
            pool.with_page(|page| async move { page.current_url().await.unwrap() }).await.unwrap();
        }
    }
}
