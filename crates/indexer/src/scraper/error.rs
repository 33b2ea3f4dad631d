//! Scraper error classification.

use thiserror::Error;

/// Why a block could not be fetched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    /// The height is not produced yet or already pruned. A control signal,
    /// not a failure.
    #[error("Height {height} is outside the node's available range: {message}")]
    ReachedBoundary {
        /// Requested height.
        height: i64,
        /// Node message.
        message: String,
    },

    /// The node answered with a non-success status or an error payload.
    #[error("RPC error at height {height}: {message}")]
    Rpc {
        /// Requested height.
        height: i64,
        /// Status and body, or the JSON-RPC error message.
        message: String,
    },

    /// The request never got an answer.
    #[error("Transport error at height {height}: {message}")]
    Transport {
        /// Requested height.
        height: i64,
        /// Client error message.
        message: String,
    },

    /// The node answered with a payload that does not decode.
    #[error("Failed to decode block {height}: {message}")]
    Decode {
        /// Requested height.
        height: i64,
        /// Decoder message.
        message: String,
    },
}

/// Node messages meaning "not produced yet" and "pruned".
pub const BOUNDARY_MESSAGES: [&str; 2] = [
    "must be less than or equal to the current blockchain height",
    "is not available, lowest height is",
];

impl ScrapeError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Rpc { .. } | ScrapeError::Transport { .. })
    }

    /// Whether this is the chain boundary signal.
    pub fn is_boundary(&self) -> bool {
        matches!(self, ScrapeError::ReachedBoundary { .. })
    }

    /// Height the error refers to.
    pub fn height(&self) -> i64 {
        match self {
            ScrapeError::ReachedBoundary { height, .. }
            | ScrapeError::Rpc { height, .. }
            | ScrapeError::Transport { height, .. }
            | ScrapeError::Decode { height, .. } => *height,
        }
    }

    /// Classify an error body returned by the node.
    pub fn from_node_message(height: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if BOUNDARY_MESSAGES.iter().any(|m| message.contains(m)) {
            ScrapeError::ReachedBoundary { height, message }
        } else {
            ScrapeError::Rpc { height, message }
        }
    }
}
