//! Partition keys
//!
//! Every cache partition is scoped by one of these keys. Equality and hashing
//! are stable across the process so the same key routes ingestion and lookups
//! to the same partition.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Instrument symbol (e.g. `BTCUSDT`), normalized to uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Symbol(symbol.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::new(s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// Asset code (e.g. `BTC`, `USDT`), normalized to uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Asset(String);

impl Asset {
    pub fn new(asset: impl Into<String>) -> Self {
        Asset(asset.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Asset::new(s)
    }
}

impl From<String> for Asset {
    fn from(s: String) -> Self {
        Asset::new(s)
    }
}

impl From<Asset> for String {
    fn from(a: Asset) -> Self {
        a.0
    }
}

/// Bar interval for klines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl KlineInterval {
    /// Length of one bar
    pub fn duration(&self) -> Duration {
        match self {
            KlineInterval::OneMinute => Duration::minutes(1),
            KlineInterval::FiveMinutes => Duration::minutes(5),
            KlineInterval::FifteenMinutes => Duration::minutes(15),
            KlineInterval::OneHour => Duration::hours(1),
            KlineInterval::FourHours => Duration::hours(4),
            KlineInterval::OneDay => Duration::days(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KlineInterval::OneMinute => "1m",
            KlineInterval::FiveMinutes => "5m",
            KlineInterval::FifteenMinutes => "15m",
            KlineInterval::OneHour => "1h",
            KlineInterval::FourHours => "4h",
            KlineInterval::OneDay => "1d",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown kline interval: {0}")]
pub struct ParseIntervalError(pub String);

impl FromStr for KlineInterval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(KlineInterval::OneMinute),
            "5m" => Ok(KlineInterval::FiveMinutes),
            "15m" => Ok(KlineInterval::FifteenMinutes),
            "1h" => Ok(KlineInterval::OneHour),
            "4h" => Ok(KlineInterval::FourHours),
            "1d" => Ok(KlineInterval::OneDay),
            other => Err(ParseIntervalError(other.to_string())),
        }
    }
}

/// Compound partition key for kline partitions: (symbol, interval)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KlineKey {
    pub symbol: Symbol,
    pub interval: KlineInterval,
}

impl KlineKey {
    pub fn new(symbol: impl Into<Symbol>, interval: KlineInterval) -> Self {
        KlineKey {
            symbol: symbol.into(),
            interval,
        }
    }
}

impl fmt::Display for KlineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalized() {
        let sym = Symbol::new(" btcusdt ");
        assert_eq!(sym.as_str(), "BTCUSDT");
        assert_eq!(sym, Symbol::from("BTCUSDT"));
    }

    #[test]
    fn test_symbol_deserialize_normalizes() {
        let sym: Symbol = serde_json::from_str("\"ethusdt\"").unwrap();
        assert_eq!(sym.as_str(), "ETHUSDT");
        assert_eq!(serde_json::to_string(&sym).unwrap(), "\"ETHUSDT\"");
    }

    #[test]
    fn test_interval_round_trip_str() {
        for interval in [
            KlineInterval::OneMinute,
            KlineInterval::FiveMinutes,
            KlineInterval::FifteenMinutes,
            KlineInterval::OneHour,
            KlineInterval::FourHours,
            KlineInterval::OneDay,
        ] {
            assert_eq!(interval.as_str().parse::<KlineInterval>().unwrap(), interval);
        }
        assert!("2m".parse::<KlineInterval>().is_err());
    }

    #[test]
    fn test_kline_key_display() {
        let key = KlineKey::new("btcusdt", KlineInterval::OneHour);
        assert_eq!(key.to_string(), "BTCUSDT@1h");
    }

    #[test]
    fn test_interval_duration() {
        assert_eq!(KlineInterval::FourHours.duration(), Duration::hours(4));
    }
}
