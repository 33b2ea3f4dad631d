//! Coin parsing and aggregation.
//!
//! Cosmos renders amounts as `"<amount><denom>"` joined by commas, e.g.
//! `"1500uinit,20ibc/27394FB0"`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// A single denomination amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination.
    pub denom: String,
    /// Amount, kept as a decimal string in JSON.
    #[serde(with = "amount_string")]
    pub amount: u128,
}

impl Coin {
    /// Parse one `"<amount><denom>"` token.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let split = token
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| CoreError::InvalidCoin(token.to_string()))?;
        let (amount, denom) = token.split_at(split);
        if amount.is_empty() || denom.is_empty() {
            return Err(CoreError::InvalidCoin(token.to_string()));
        }
        let amount = amount
            .parse::<u128>()
            .map_err(|_| CoreError::InvalidCoin(token.to_string()))?;
        Ok(Self {
            denom: denom.to_string(),
            amount,
        })
    }
}

/// Parse a comma-separated coin list. An empty string is an empty list.
pub fn parse_coins(value: &str) -> Result<Vec<Coin>> {
    value
        .split(',')
        .filter(|token| !token.trim().is_empty())
        .map(Coin::parse)
        .collect()
}

/// Per-denom running totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinTotals(BTreeMap<String, u128>);

impl CoinTotals {
    /// Create empty totals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one coin.
    pub fn add(&mut self, coin: &Coin) {
        let entry = self.0.entry(coin.denom.clone()).or_insert(0);
        *entry = entry.saturating_add(coin.amount);
    }

    /// Add every coin in a comma-separated list.
    pub fn add_all(&mut self, value: &str) -> Result<()> {
        for coin in parse_coins(value)? {
            self.add(&coin);
        }
        Ok(())
    }

    /// Totals sorted by denom.
    pub fn coins(&self) -> Vec<Coin> {
        self.0
            .iter()
            .map(|(denom, amount)| Coin {
                denom: denom.clone(),
                amount: *amount,
            })
            .collect()
    }

    /// Whether nothing was added.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coins() {
        let coins = parse_coins("1500uinit,20ibc/27394FB0").unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].denom, "uinit");
        assert_eq!(coins[0].amount, 1500);
        assert_eq!(coins[1].denom, "ibc/27394FB0");

        assert!(parse_coins("").unwrap().is_empty());
        assert!(parse_coins("uinit").is_err());
        assert!(parse_coins("100").is_err());
    }

    #[test]
    fn test_totals_aggregate_by_denom() {
        let mut totals = CoinTotals::new();
        totals.add_all("100uinit,5uusdc").unwrap();
        totals.add_all("50uinit").unwrap();

        let coins = totals.coins();
        assert_eq!(coins[0], Coin { denom: "uinit".into(), amount: 150 });
        assert_eq!(coins[1], Coin { denom: "uusdc".into(), amount: 5 });
    }

    #[test]
    fn test_coin_json_uses_string_amounts() {
        let json = serde_json::to_string(&Coin { denom: "uinit".into(), amount: 7 }).unwrap();
        assert_eq!(json, r#"{"denom":"uinit","amount":"7"}"#);
    }
}
