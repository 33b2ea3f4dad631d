//! Post-commit block notifications.
//!
//! Downstream consumers (a message queue, a websocket fan-out) plug in here.
//! A notifier failure never undoes a commit.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// A block that has just been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockNotification {
    /// Chain the block belongs to.
    pub chain_id: String,
    /// Committed height.
    pub height: i64,
    /// Hashes of the block's transactions, in block order.
    pub tx_hashes: Vec<String>,
}

/// Receives a notification after each committed block.
#[async_trait]
pub trait BlockNotifier: Send + Sync {
    /// Deliver `notification`.
    async fn notify(&self, notification: &BlockNotification) -> Result<()>;
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl BlockNotifier for LoggingNotifier {
    async fn notify(&self, notification: &BlockNotification) -> Result<()> {
        debug!(
            chain_id = %notification.chain_id,
            height = notification.height,
            txs = notification.tx_hashes.len(),
            "Block committed"
        );
        Ok(())
    }
}

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<BlockNotification>>,
}

impl RecordingNotifier {
    /// Notifications received so far, in delivery order.
    pub fn notifications(&self) -> Vec<BlockNotification> {
        self.seen.lock().clone()
    }

    /// Heights received so far, in delivery order.
    pub fn heights(&self) -> Vec<i64> {
        self.seen.lock().iter().map(|n| n.height).collect()
    }
}

#[async_trait]
impl BlockNotifier for RecordingNotifier {
    async fn notify(&self, notification: &BlockNotification) -> Result<()> {
        self.seen.lock().push(notification.clone());
        Ok(())
    }
}
