//! Staging area between out-of-order preparation and in-order commit.

use parking_lot::Mutex;
use rollscan_core::ScrapedBlock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
struct Inner {
    cursor: i64,
    in_flight: BTreeSet<i64>,
    staged: BTreeMap<i64, ScrapedBlock>,
}

/// Heights being prepared, prepared blocks waiting for commit and the next
/// height to commit.
#[derive(Debug)]
pub struct StagingArea {
    inner: Mutex<Inner>,
}

impl StagingArea {
    /// Start with `cursor` as the next height to commit.
    pub fn new(cursor: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cursor,
                in_flight: BTreeSet::new(),
                staged: BTreeMap::new(),
            }),
        }
    }

    /// Reserve `height` for preparation.
    ///
    /// Returns `false` for heights already committed, staged or being
    /// prepared; such blocks are dropped.
    pub fn claim(&self, height: i64) -> bool {
        let mut inner = self.inner.lock();
        if height < inner.cursor || inner.staged.contains_key(&height) {
            return false;
        }
        inner.in_flight.insert(height)
    }

    /// Store a prepared block.
    pub fn stage(&self, block: ScrapedBlock) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&block.height);
        if block.height >= inner.cursor {
            inner.staged.insert(block.height, block);
        }
    }

    /// Take the block at the cursor, if it is prepared.
    pub fn take_next(&self) -> Option<ScrapedBlock> {
        let mut inner = self.inner.lock();
        let cursor = inner.cursor;
        inner.staged.remove(&cursor)
    }

    /// Move the cursor past a committed block.
    pub fn advance(&self) {
        self.inner.lock().cursor += 1;
    }

    /// Next height to commit.
    pub fn cursor(&self) -> i64 {
        self.inner.lock().cursor
    }

    /// `(staged, in_flight)` counts.
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.staged.len(), inner.in_flight.len())
    }
}
