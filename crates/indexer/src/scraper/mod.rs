//! Block acquisition.
//!
//! The scraper runs in two phases:
//! - **fast sync** spawns one fetch per height without waiting for earlier
//!   ones, until some fetch reports that the node has no such height yet
//! - **slow sync** then follows the head in small concurrent windows,
//!   rewinding to the lowest failed height after every partial round
//!
//! Blocks are emitted on a bounded queue in completion order; ordering is
//! restored downstream by the orchestrator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use rollscan_core::ScrapedBlock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;

pub mod error;
pub mod rpc;
pub mod tracker;

pub use error::ScrapeError;
pub use rpc::RpcClient;
pub use tracker::SyncedHeights;

/// Level-triggered flow control broadcast by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeControl {
    /// Issue new fetches.
    Running,
    /// Hold off until `Running` again. Fetches already in flight finish.
    Paused,
}

/// Anything that can produce a [`ScrapedBlock`] for a height.
#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    /// Fetch the block and its execution results at `height`.
    async fn fetch_block(&self, height: i64) -> Result<ScrapedBlock, ScrapeError>;
}

/// Pulls blocks from a [`BlockSource`] onto the block queue.
pub struct Scraper<S> {
    source: Arc<S>,
    config: ScraperConfig,
    output: mpsc::Sender<ScrapedBlock>,
    control: watch::Receiver<ScrapeControl>,
}

/// Everything a single fetch task needs.
struct FetchTask<S> {
    source: Arc<S>,
    output: mpsc::Sender<ScrapedBlock>,
    max_retries: u32,
    cooling: Duration,
}

impl<S> Clone for FetchTask<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            output: self.output.clone(),
            max_retries: self.max_retries,
            cooling: self.cooling,
        }
    }
}

impl<S: BlockSource> FetchTask<S> {
    /// Fetch `height`, retrying transient errors. Returns `false` when the
    /// height lies beyond the chain boundary.
    async fn fetch_with_retry(&self, height: i64) -> Result<bool> {
        let mut attempt = 0u32;
        loop {
            match self.source.fetch_block(height).await {
                Ok(block) => {
                    self.emit(block).await?;
                    return Ok(true);
                }
                Err(err) if err.is_boundary() => {
                    debug!(height, "Reached chain boundary");
                    return Ok(false);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Fetch of block {} failed (attempt {}/{}), retrying: {}",
                        height, attempt, self.max_retries, err
                    );
                    tokio::time::sleep(self.cooling).await;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to fetch block {}", height));
                }
            }
        }
    }

    async fn emit(&self, block: ScrapedBlock) -> Result<()> {
        let height = block.height;
        self.output
            .send(block)
            .await
            .map_err(|_| anyhow::anyhow!("Block queue closed while emitting block {}", height))
    }
}

impl<S: BlockSource> Scraper<S> {
    /// Create a scraper writing to `output` and obeying `control`.
    pub fn new(
        source: Arc<S>,
        config: ScraperConfig,
        output: mpsc::Sender<ScrapedBlock>,
        control: watch::Receiver<ScrapeControl>,
    ) -> Self {
        Self {
            source,
            config,
            output,
            control,
        }
    }

    /// Fast sync from `start`, then follow the head forever.
    pub async fn run(mut self, start: i64) -> Result<()> {
        info!("Starting fast sync from height {}", start);
        let synced = self.fast_sync(start).await?;
        info!("Fast sync complete at height {}, switching to slow sync", synced);
        self.slow_sync(synced + 1).await
    }

    fn task(&self) -> FetchTask<S> {
        FetchTask {
            source: Arc::clone(&self.source),
            output: self.output.clone(),
            max_retries: self.config.max_retries,
            cooling: self.config.cooling(),
        }
    }

    async fn wait_until_running(&mut self) -> Result<()> {
        if *self.control.borrow() == ScrapeControl::Paused {
            debug!("Scraper paused");
        }
        self.control
            .wait_for(|state| *state == ScrapeControl::Running)
            .await
            .map(|_| ())
            .context("Scraper control channel closed")
    }

    /// Fetch heights `start, start + 1, ...` concurrently until the node
    /// reports the boundary.
    ///
    /// Returns the contiguous synced height: every height from `start` up to
    /// and including it was emitted. Returns `start - 1` if nothing was.
    pub async fn fast_sync(&mut self, start: i64) -> Result<i64> {
        let boundary = Arc::new(AtomicBool::new(false));
        let tracker = Arc::new(SyncedHeights::new(start));
        let mut tasks = JoinSet::new();
        let mut height = start;

        while !boundary.load(Ordering::Acquire) {
            // Keep reaping fetches while paused: the orchestrator only
            // resumes once the cursor block arrives, so a failed fetch must
            // surface here or the pipeline stalls.
            loop {
                tokio::select! {
                    state = self.control.wait_for(|state| *state == ScrapeControl::Running) => {
                        state.map(|_| ()).context("Scraper control channel closed")?;
                        break;
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        joined.context("Fetch task panicked")??;
                    }
                }
            }
            if boundary.load(Ordering::Acquire) {
                break;
            }

            let task = self.task();
            let boundary = Arc::clone(&boundary);
            let tracker = Arc::clone(&tracker);
            tasks.spawn(async move {
                if task.fetch_with_retry(height).await? {
                    tracker.mark(height);
                } else {
                    boundary.store(true, Ordering::Release);
                }
                Ok::<_, anyhow::Error>(())
            });

            height += 1;
            tokio::time::sleep(self.config.fetch_interval()).await;
        }

        while let Some(joined) = tasks.join_next().await {
            joined.context("Fetch task panicked")??;
        }

        Ok(tracker.watermark())
    }

    /// Follow the head in windows of `window_size` heights. Never returns
    /// except on a fatal error.
    pub async fn slow_sync(&mut self, start: i64) -> Result<()> {
        let window = self.config.window_size as i64;
        let mut next = start;
        let mut failed_rounds = 0u32;

        loop {
            self.wait_until_running().await?;

            let task = self.task();
            let mut fetches: FuturesUnordered<_> = (next..next + window)
                .map(|height| {
                    let task = task.clone();
                    async move {
                        match task.source.fetch_block(height).await {
                            Ok(block) => task.emit(block).await.map(|_| None),
                            Err(err) => Ok(Some(err)),
                        }
                    }
                })
                .collect();

            let mut lowest: Option<ScrapeError> = None;
            while let Some(outcome) = fetches.next().await {
                let Some(err) = outcome? else { continue };
                if matches!(err, ScrapeError::Decode { .. }) {
                    return Err(err).context("Slow sync received an undecodable block");
                }
                if lowest.as_ref().map_or(true, |l| err.height() < l.height()) {
                    lowest = Some(err);
                }
            }
            drop(fetches);

            match lowest {
                None => {
                    debug!("Slow sync window {}..{} complete", next, next + window);
                    next += window;
                    failed_rounds = 0;
                }
                Some(err) => {
                    if err.is_boundary() {
                        failed_rounds = 0;
                    } else {
                        failed_rounds += 1;
                        warn!(
                            "Slow sync failed at height {} ({}/{}): {}",
                            err.height(),
                            failed_rounds,
                            self.config.max_retries,
                            err
                        );
                        if failed_rounds > self.config.max_retries {
                            return Err(err).context("Slow sync retries exhausted");
                        }
                    }
                    next = err.height();
                    tokio::time::sleep(self.config.cooling()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChain;

    fn test_config() -> ScraperConfig {
        ScraperConfig {
            start_height: 1,
            max_retries: 5,
            cooling_ms: 1,
            fetch_interval_ms: 1,
            window_size: 5,
            queue_capacity: 1000,
        }
    }

    fn scraper(
        chain: Arc<MockChain>,
    ) -> (
        Scraper<MockChain>,
        mpsc::Receiver<ScrapedBlock>,
        watch::Sender<ScrapeControl>,
    ) {
        let (tx, rx) = mpsc::channel(1000);
        let (control_tx, control_rx) = watch::channel(ScrapeControl::Running);
        (Scraper::new(chain, test_config(), tx, control_rx), rx, control_tx)
    }

    fn drain(rx: &mut mpsc::Receiver<ScrapedBlock>) -> Vec<i64> {
        let mut heights = Vec::new();
        while let Ok(block) = rx.try_recv() {
            heights.push(block.height);
        }
        heights.sort_unstable();
        heights
    }

    #[tokio::test]
    async fn test_fast_sync_stops_at_head() {
        let chain = Arc::new(MockChain::new("rollup-1", 53));
        let (mut scraper, mut rx, _control) = scraper(Arc::clone(&chain));

        let synced = scraper.fast_sync(50).await.unwrap();
        assert_eq!(synced, 53);
        assert_eq!(drain(&mut rx), vec![50, 51, 52, 53]);
    }

    #[tokio::test]
    async fn test_fast_sync_beyond_head_returns_start_minus_one() {
        let chain = Arc::new(MockChain::new("rollup-1", 10));
        let (mut scraper, mut rx, _control) = scraper(chain);

        assert_eq!(scraper.fast_sync(20).await.unwrap(), 19);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_fast_sync_retries_transient_errors() {
        let chain = Arc::new(MockChain::new("rollup-1", 5));
        chain.fail_times(3, 2);
        let (mut scraper, mut rx, _control) = scraper(Arc::clone(&chain));

        assert_eq!(scraper.fast_sync(1).await.unwrap(), 5);
        assert_eq!(drain(&mut rx), vec![1, 2, 3, 4, 5]);
        assert!(chain.fetch_count(3) >= 3);
    }

    #[tokio::test]
    async fn test_fast_sync_fails_after_retries_exhausted() {
        let chain = Arc::new(MockChain::new("rollup-1", 5));
        chain.fail_times(2, 100);
        let (mut scraper, _rx, _control) = scraper(chain);

        let err = scraper.fast_sync(1).await.unwrap_err();
        assert!(format!("{:#}", err).contains("block 2"));
    }

    #[tokio::test]
    async fn test_fast_sync_decode_error_is_fatal() {
        let chain = Arc::new(MockChain::new("rollup-1", 5));
        chain.corrupt(4);
        let (mut scraper, _rx, _control) = scraper(Arc::clone(&chain));

        assert!(scraper.fast_sync(1).await.is_err());
        assert_eq!(chain.fetch_count(4), 1);
    }

    #[tokio::test]
    async fn test_fast_sync_fails_while_paused() {
        let chain = Arc::new(MockChain::new("rollup-1", 100_000));
        chain.fail_times(2, 1000);
        chain.delay(2, Duration::from_millis(20));
        let (mut scraper, _rx, control) = scraper(Arc::clone(&chain));

        let handle = tokio::spawn(async move { scraper.fast_sync(1).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        control.send(ScrapeControl::Paused).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("fast sync stalled while paused")
            .unwrap();
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("block 2"));
        assert_eq!(chain.fetch_count(2), 6);
    }

    #[tokio::test]
    async fn test_slow_sync_follows_head() {
        let chain = Arc::new(MockChain::new("rollup-1", 3));
        let (mut scraper, mut rx, _control) = scraper(Arc::clone(&chain));

        let handle = tokio::spawn(async move { scraper.slow_sync(1).await });

        let mut seen = Vec::new();
        while seen.len() < 3 {
            seen.push(rx.recv().await.unwrap().height);
        }
        chain.set_head(7);
        while !seen.contains(&7) {
            seen.push(rx.recv().await.unwrap().height);
        }
        handle.abort();

        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_pause_blocks_new_fetches() {
        let chain = Arc::new(MockChain::new("rollup-1", 1000));
        let (mut scraper, mut rx, control) = scraper(Arc::clone(&chain));
        control.send(ScrapeControl::Paused).unwrap();

        let handle = tokio::spawn(async move { scraper.fast_sync(1).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        chain.set_head(3);
        control.send(ScrapeControl::Running).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }
}
