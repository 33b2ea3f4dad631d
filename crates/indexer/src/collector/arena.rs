//! Height-keyed storage for prepared block data.
//!
//! A submodule's `prepare` runs concurrently for many heights and its
//! `collect` later runs in height order. The arena carries the prepared
//! value from one to the other.

use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Arena failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// `collect` ran for a height whose `prepare` never stored anything.
    #[error("{submodule}: block {height} was not prepared")]
    NotPrepared {
        /// Submodule name.
        submodule: &'static str,
        /// Block height.
        height: i64,
    },

    /// Too many prepared heights are waiting for commit.
    #[error("{submodule}: prepare arena is full ({capacity} heights)")]
    Full {
        /// Submodule name.
        submodule: &'static str,
        /// Configured capacity.
        capacity: usize,
    },
}

/// Bounded map from height to a prepared value.
#[derive(Debug)]
pub struct PrepareArena<T> {
    submodule: &'static str,
    capacity: usize,
    entries: Mutex<HashMap<i64, T>>,
}

impl<T> PrepareArena<T> {
    /// Create an arena for `submodule` holding at most `capacity` heights.
    pub fn new(submodule: &'static str, capacity: usize) -> Self {
        Self {
            submodule,
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store the prepared value for `height`, replacing an earlier one.
    pub fn insert(&self, height: i64, value: T) -> Result<(), ArenaError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&height) && entries.len() >= self.capacity {
            return Err(ArenaError::Full {
                submodule: self.submodule,
                capacity: self.capacity,
            });
        }
        entries.insert(height, value);
        Ok(())
    }

    /// Remove and return the prepared value for `height`.
    pub fn take(&self, height: i64) -> Result<T, ArenaError> {
        self.entries
            .lock()
            .remove(&height)
            .ok_or(ArenaError::NotPrepared {
                submodule: self.submodule,
                height,
            })
    }

    /// Number of heights waiting for commit.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_returns_prepared_value_once() {
        let arena = PrepareArena::new("block", 4);
        arena.insert(10, "ten").unwrap();

        assert_eq!(arena.take(10).unwrap(), "ten");
        assert_eq!(
            arena.take(10),
            Err(ArenaError::NotPrepared {
                submodule: "block",
                height: 10
            })
        );
    }

    #[test]
    fn test_capacity_is_enforced() {
        let arena = PrepareArena::new("nft", 2);
        arena.insert(1, ()).unwrap();
        arena.insert(2, ()).unwrap();
        assert!(matches!(arena.insert(3, ()), Err(ArenaError::Full { capacity: 2, .. })));

        // Re-preparing a stored height is allowed at capacity.
        arena.insert(2, ()).unwrap();
        arena.take(1).unwrap();
        arena.insert(3, ()).unwrap();
        assert_eq!(arena.len(), 2);
    }
}
