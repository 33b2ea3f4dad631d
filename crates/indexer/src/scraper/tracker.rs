//! Contiguous synced-height tracking.

use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Tracks which heights were fetched and reports the contiguous prefix.
///
/// Fetches finish out of order; the watermark only moves once every height
/// below it is done.
#[derive(Debug)]
pub struct SyncedHeights {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    watermark: i64,
    ahead: BTreeSet<i64>,
}

impl SyncedHeights {
    /// Start tracking at `start`; the watermark begins at `start - 1`.
    pub fn new(start: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                watermark: start - 1,
                ahead: BTreeSet::new(),
            }),
        }
    }

    /// Record a fetched height.
    pub fn mark(&self, height: i64) {
        let mut inner = self.inner.lock();
        if height <= inner.watermark {
            return;
        }
        if height != inner.watermark + 1 {
            inner.ahead.insert(height);
            return;
        }

        inner.watermark = height;
        loop {
            let next = inner.watermark + 1;
            if !inner.ahead.remove(&next) {
                break;
            }
            inner.watermark = next;
        }
    }

    /// Highest height such that every height from the start up to it is done.
    pub fn watermark(&self) -> i64 {
        self.inner.lock().watermark
    }
}
