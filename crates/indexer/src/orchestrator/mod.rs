//! Out-of-order preparation, in-order commit.
//!
//! Three loops run side by side:
//! - the scraper pushes blocks onto the block queue
//! - the dispatcher drains the queue and spawns one prepare task per block
//! - the commit loop collects the block at the cursor once it is staged,
//!   and drives the scraper's pause/resume signal
//!
//! Any error from any loop stops the whole pipeline.

use anyhow::{Context, Result};
use rollscan_core::ScrapedBlock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::collector::Collector;
use crate::config::{OrchestratorConfig, ScraperConfig};
use crate::scraper::{BlockSource, ScrapeControl, Scraper};
use crate::storage::Storage;

pub mod backpressure;
pub mod staging;

pub use backpressure::Backpressure;
pub use staging::StagingArea;

/// Wires scraper, collector and storage together.
pub struct Orchestrator<S> {
    chain_id: String,
    source: Arc<S>,
    collector: Arc<Collector>,
    storage: Storage,
    scraper_config: ScraperConfig,
    config: OrchestratorConfig,
    stop_after: Option<i64>,
}

impl<S: BlockSource> Orchestrator<S> {
    /// Create an orchestrator.
    pub fn new(
        chain_id: impl Into<String>,
        source: Arc<S>,
        collector: Arc<Collector>,
        storage: Storage,
        scraper_config: ScraperConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            source,
            collector,
            storage,
            scraper_config,
            config,
            stop_after: None,
        }
    }

    /// Return from [`run`](Self::run) once `height` is committed.
    pub fn stop_after(mut self, height: i64) -> Self {
        self.stop_after = Some(height);
        self
    }

    /// First height to commit: one past the last committed height, or the
    /// configured start height on an empty store.
    pub async fn start_height(&self) -> Result<i64> {
        let last = self
            .storage
            .last_committed_height(&self.chain_id)
            .await
            .context("Failed to read last committed height")?;
        Ok(match last {
            Some(height) => height + 1,
            None => self.scraper_config.start_height,
        })
    }

    /// Run until a fatal error, or until the `stop_after` height is committed.
    pub async fn run(self) -> Result<()> {
        let start = self.start_height().await?;
        info!("Orchestrator starting at height {}", start);

        let (block_tx, block_rx) = mpsc::channel(self.scraper_config.queue_capacity);
        let (control_tx, control_rx) = watch::channel(ScrapeControl::Running);
        let staging = Arc::new(StagingArea::new(start));

        let scraper = Scraper::new(
            Arc::clone(&self.source),
            self.scraper_config.clone(),
            block_tx,
            control_rx,
        );

        let dispatcher = Dispatcher {
            blocks: block_rx,
            staging: Arc::clone(&staging),
            collector: Arc::clone(&self.collector),
        };

        let committer = Committer {
            staging,
            collector: Arc::clone(&self.collector),
            control: control_tx,
            backpressure: Backpressure::new(
                self.config.pause_threshold,
                self.config.resume_threshold,
            ),
            config: self.config.clone(),
            stop_after: self.stop_after,
        };

        tokio::select! {
            result = scraper.run(start) => {
                result.context("Scraper failed")?;
                warn!("Scraper exited unexpectedly");
                Ok(())
            }
            result = dispatcher.run() => {
                result.context("Dispatcher failed")?;
                warn!("Block queue closed");
                Ok(())
            }
            result = committer.run() => {
                result.context("Commit loop failed")
            }
        }
    }
}

struct Dispatcher {
    blocks: mpsc::Receiver<ScrapedBlock>,
    staging: Arc<StagingArea>,
    collector: Arc<Collector>,
}

impl Dispatcher {
    async fn run(mut self) -> Result<()> {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                received = self.blocks.recv() => {
                    let Some(block) = received else { break };
                    if !self.staging.claim(block.height) {
                        debug!("Dropping block {}: already committed or claimed", block.height);
                        continue;
                    }

                    let staging = Arc::clone(&self.staging);
                    let collector = Arc::clone(&self.collector);
                    tasks.spawn(async move {
                        collector.prepare(&block).await?;
                        staging.stage(block);
                        Ok::<_, anyhow::Error>(())
                    });
                }
                Some(joined) = tasks.join_next() => {
                    joined.context("Prepare task panicked")??;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            joined.context("Prepare task panicked")??;
        }
        Ok(())
    }
}

struct Committer {
    staging: Arc<StagingArea>,
    collector: Arc<Collector>,
    control: watch::Sender<ScrapeControl>,
    backpressure: Backpressure,
    config: OrchestratorConfig,
    stop_after: Option<i64>,
}

impl Committer {
    async fn run(mut self) -> Result<()> {
        loop {
            if self
                .stop_after
                .is_some_and(|stop| self.staging.cursor() > stop)
            {
                info!("Committed up to height {}, stopping", self.staging.cursor() - 1);
                return Ok(());
            }

            let (staged, in_flight) = self.staging.counts();
            if let Some(state) = self.backpressure.evaluate(staged, in_flight) {
                info!(
                    "Scraper {:?} (staged {}, in flight {})",
                    state, staged, in_flight
                );
                self.control.send_replace(state);
            }

            match self.staging.take_next() {
                Some(block) => {
                    self.collector.collect(&block).await?;
                    self.staging.advance();
                }
                None => tokio::time::sleep(self.config.cooling()).await,
            }
        }
    }
}
