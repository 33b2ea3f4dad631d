//! Node query errors.

use thiserror::Error;

/// Node answers meaning "this address is not what you think it is".
const INVALID_NFT_PATTERNS: [&str; 5] = [
    "execution reverted",
    "unknown variant",
    "Error parsing into type",
    "not found",
    "no such contract",
];

/// Failure of a REST or JSON-RPC query against the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Non-success HTTP status.
    #[error("Node returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// JSON-RPC error object.
    #[error("Node query failed: {0}")]
    Node(String),

    /// Request failed before an answer arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response envelope did not have the expected shape.
    #[error("Unexpected node response: {0}")]
    Decode(String),

    /// Contract returned bytes that do not decode as the expected ABI type.
    #[error("Invalid contract return data: {0}")]
    Abi(String),

    /// The query needs an endpoint that is not configured.
    #[error("Endpoint not configured: {0}")]
    NotConfigured(&'static str),
}

impl QueryError {
    /// Whether the queried address is not a valid NFT contract or object.
    ///
    /// Such addresses are blacklisted; every other query error is fatal for
    /// the block being prepared.
    pub fn is_invalid_nft(&self) -> bool {
        match self {
            QueryError::Status { status: 404, .. } | QueryError::Abi(_) => true,
            QueryError::Status { body: message, .. } | QueryError::Node(message) => {
                INVALID_NFT_PATTERNS.iter().any(|p| message.contains(p))
            }
            _ => false,
        }
    }
}
