//! Address normalization.
//!
//! Events spell the same account in several ways (mixed-case hex, short Move
//! addresses). Everything stored goes through these helpers first.

use crate::error::{CoreError, Result};

/// Normalize a 20-byte `0x` hex address to lowercase.
///
/// Returns `None` when `value` is not exactly `0x` followed by 40 hex digits.
pub fn normalize_evm_address(value: &str) -> Option<String> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex.to_ascii_lowercase()))
}

/// Normalize a Move address to its full 32-byte lowercase form.
///
/// `0x1` becomes `0x000…001`.
pub fn normalize_move_address(value: &str) -> Result<String> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if hex.is_empty() || hex.len() > 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidAddress(value.to_string()));
    }
    Ok(format!("0x{:0>64}", hex.to_ascii_lowercase()))
}

/// Whether `value` looks like a bech32 account address with `prefix`.
///
/// Checks the human-readable part, separator, charset and the length of a
/// 20- or 32-byte payload. The checksum is not verified.
pub fn is_bech32_account(value: &str, prefix: &str) -> bool {
    let Some(data) = value
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('1'))
    else {
        return false;
    };

    // 20 bytes -> 32 chars + 6 checksum, 32 bytes -> 52 + 6
    const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
    (data.len() == 38 || data.len() == 58) && data.chars().all(|c| CHARSET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_evm_address() {
        assert_eq!(
            normalize_evm_address("0xABCDEFabcdef0123456789012345678901234567").as_deref(),
            Some("0xabcdefabcdef0123456789012345678901234567")
        );
        assert!(normalize_evm_address("0x1234").is_none());
        assert!(normalize_evm_address("abcdefabcdef0123456789012345678901234567").is_none());
        assert!(normalize_evm_address("0xzzcdefabcdef0123456789012345678901234567").is_none());
    }

    #[test]
    fn test_normalize_move_address_pads_short_form() {
        let addr = normalize_move_address("0x1").unwrap();
        assert_eq!(addr.len(), 66);
        assert!(addr.ends_with("01"));
        assert_eq!(normalize_move_address("0xAB").unwrap(), normalize_move_address("ab").unwrap());
        assert!(normalize_move_address("0x").is_err());
        assert!(normalize_move_address("0xnothex").is_err());
    }

    #[test]
    fn test_is_bech32_account() {
        assert!(is_bech32_account(
            "init1qyqszqgpqyqszqgpqyqszqgpqyqszqgp2kqn8q",
            "init"
        ));
        assert!(!is_bech32_account(
            "cosmos1qyqszqgpqyqszqgpqyqszqgpqyqszqgp2kqn8q",
            "init"
        ));
        assert!(!is_bech32_account("init1short", "init"));
        assert!(!is_bech32_account("initia", "init"));
    }
}
