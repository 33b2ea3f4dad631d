//! Cosmos transaction envelope decoding.
//!
//! Only the parts of `cosmos.tx.v1beta1.TxRaw` and `TxBody` the indexer
//! stores are modelled. Message payloads stay opaque: each message keeps its
//! type URL and its protobuf bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// `cosmos.tx.v1beta1.TxRaw`.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

/// `cosmos.tx.v1beta1.TxBody`, without extension options.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

/// `google.protobuf.Any`.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: ::prost::alloc::vec::Vec<u8>,
}

/// A message of a decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMsg {
    /// Protobuf type URL, e.g. `/cosmos.bank.v1beta1.MsgSend`.
    pub type_url: String,
    /// Message bytes, base64.
    pub value: String,
}

/// The stored view of a transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedTx {
    /// Messages in body order.
    pub messages: Vec<DecodedMsg>,
    /// Memo, empty if unset.
    pub memo: String,
    /// Timeout height, 0 if unset.
    pub timeout_height: u64,
    /// Number of signatures on the envelope.
    pub signature_count: usize,
}

impl DecodedTx {
    /// Type URLs of the messages, in order.
    pub fn message_types(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|msg| msg.type_url.as_str())
    }
}

/// Decode a base64 `TxRaw` and its body.
///
/// `index` is only used to report which transaction failed.
pub fn decode_tx(raw_base64: &str, index: usize) -> Result<DecodedTx> {
    let invalid = |reason: String| CoreError::InvalidTxBody { index, reason };

    let bytes = STANDARD
        .decode(raw_base64)
        .map_err(|e| CoreError::InvalidTxEncoding {
            index,
            reason: e.to_string(),
        })?;
    let raw = TxRaw::decode(bytes.as_slice()).map_err(|e| invalid(format!("TxRaw: {}", e)))?;
    if raw.body_bytes.is_empty() {
        return Err(invalid("empty body".into()));
    }
    let body = TxBody::decode(raw.body_bytes.as_slice())
        .map_err(|e| invalid(format!("TxBody: {}", e)))?;

    Ok(DecodedTx {
        messages: body
            .messages
            .into_iter()
            .map(|msg| DecodedMsg {
                type_url: msg.type_url,
                value: STANDARD.encode(msg.value),
            })
            .collect(),
        memo: body.memo,
        timeout_height: body.timeout_height,
        signature_count: raw.signatures.len(),
    })
}

/// Encode a `TxRaw` with the given messages and memo, base64.
///
/// Used to build fixtures; the indexer itself never encodes transactions.
pub fn encode_tx(messages: &[(&str, &[u8])], memo: &str, signatures: usize) -> String {
    let body = TxBody {
        messages: messages
            .iter()
            .map(|(type_url, value)| Any {
                type_url: type_url.to_string(),
                value: value.to_vec(),
            })
            .collect(),
        memo: memo.to_string(),
        timeout_height: 0,
    };
    let raw = TxRaw {
        body_bytes: body.encode_to_vec(),
        auth_info_bytes: Vec::new(),
        signatures: vec![vec![0u8; 64]; signatures],
    };
    STANDARD.encode(raw.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bank_send() {
        let raw = encode_tx(
            &[
                ("/cosmos.bank.v1beta1.MsgSend", &b"\x0a\x04init"[..]),
                ("/initia.move.v1.MsgExecute", &b""[..]),
            ],
            "gm",
            1,
        );

        let tx = decode_tx(&raw, 0).unwrap();
        assert_eq!(
            tx.message_types().collect::<Vec<_>>(),
            vec!["/cosmos.bank.v1beta1.MsgSend", "/initia.move.v1.MsgExecute"]
        );
        assert_eq!(tx.messages[0].value, "CgRpbml0");
        assert_eq!(tx.memo, "gm");
        assert_eq!(tx.signature_count, 1);
    }

    #[test]
    fn test_decode_rejects_non_envelope() {
        // A single byte with field number 0 is never valid protobuf.
        assert!(matches!(
            decode_tx("AQ==", 3),
            Err(CoreError::InvalidTxBody { index: 3, .. })
        ));
        assert!(matches!(
            decode_tx("%%%", 1),
            Err(CoreError::InvalidTxEncoding { index: 1, .. })
        ));
    }
}
