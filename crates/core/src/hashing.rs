//! Hashing utilities.
//!
//! Cosmos transaction hashes and CometBFT consensus addresses are both plain
//! SHA-256 digests rendered as uppercase hex.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Hash of a base64-encoded raw transaction.
///
/// `index` is only used to report which transaction failed to decode.
///
/// # Example
///
/// ```
/// use rollscan_core::hashing::tx_hash;
///
/// let hash = tx_hash("aGVsbG8=", 0).unwrap();
/// assert_eq!(hash.len(), 64);
/// ```
pub fn tx_hash(raw_base64: &str, index: usize) -> Result<String> {
    let bytes = STANDARD
        .decode(raw_base64)
        .map_err(|e| CoreError::InvalidTxEncoding {
            index,
            reason: e.to_string(),
        })?;
    Ok(tx_hash_bytes(&bytes))
}

/// Hash of raw transaction bytes.
pub fn tx_hash_bytes(bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(bytes))
}

/// Consensus address of an ed25519 validator key: the first 20 bytes of
/// `sha256(pubkey)`, uppercase hex.
pub fn consensus_address(pubkey: &[u8]) -> String {
    let digest = Sha256::digest(pubkey);
    hex::encode_upper(&digest[..20])
}
