//! Decoded exchange events
//!
//! Wire decoding happens upstream; by the time an event is a `MarketEvent`
//! it is a typed domain value. It may still be malformed (a feed can send
//! garbage), which is what `validate` catches before routing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::entities::{AccountTrade, Balance, Kline, MiniTicker, Order};
use crate::values::Timestamp;

/// Anything carrying its own exchange event time
///
/// Merges compare this, never arrival order.
pub trait EventTimed {
    fn event_time(&self) -> Timestamp;
}

/// Why an event payload was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Partition key is empty")]
    EmptyKey,

    #[error("Negative value for {0}")]
    NegativeValue(&'static str),

    #[error("Non-positive value for {0}")]
    NonPositive(&'static str),

    #[error("Inverted range: {0}")]
    InvertedRange(&'static str),

    #[error("Executed quantity {executed} exceeds original quantity {original}")]
    Overfilled { executed: Decimal, original: Decimal },
}

/// Error notification pushed by the exchange on the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub code: i32,
    pub message: String,
    pub time: Timestamp,
}

/// Discriminant of a `MarketEvent`, used for stats and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ticker,
    Kline,
    Order,
    Trade,
    Balance,
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Ticker => "ticker",
            EventKind::Kline => "kline",
            EventKind::Order => "order",
            EventKind::Trade => "trade",
            EventKind::Balance => "balance",
            EventKind::Error => "error",
        };
        f.write_str(name)
    }
}

/// Heterogeneous event stream item consumed by the ingestion pump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    Ticker(MiniTicker),
    Kline(Kline),
    Order(Order),
    Trade(AccountTrade),
    Balance(Balance),
    Error(ErrorFrame),
}

impl MarketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MarketEvent::Ticker(_) => EventKind::Ticker,
            MarketEvent::Kline(_) => EventKind::Kline,
            MarketEvent::Order(_) => EventKind::Order,
            MarketEvent::Trade(_) => EventKind::Trade,
            MarketEvent::Balance(_) => EventKind::Balance,
            MarketEvent::Error(_) => EventKind::Error,
        }
    }

    /// Exchange time of the event
    pub fn event_time(&self) -> Timestamp {
        match self {
            MarketEvent::Ticker(t) => t.event_time(),
            MarketEvent::Kline(k) => k.event_time(),
            MarketEvent::Order(o) => o.event_time(),
            MarketEvent::Trade(t) => t.event_time(),
            MarketEvent::Balance(b) => b.event_time(),
            MarketEvent::Error(e) => e.time,
        }
    }

    /// Human-readable partition key, for diagnostics
    pub fn partition_label(&self) -> String {
        match self {
            MarketEvent::Ticker(t) => t.symbol.to_string(),
            MarketEvent::Kline(k) => k.key().to_string(),
            MarketEvent::Order(o) => o.symbol.to_string(),
            MarketEvent::Trade(t) => t.symbol.to_string(),
            MarketEvent::Balance(b) => b.asset.to_string(),
            MarketEvent::Error(e) => format!("error:{}", e.code),
        }
    }

    /// Reject malformed payloads. Error frames are always well-formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            MarketEvent::Ticker(t) => t.validate(),
            MarketEvent::Kline(k) => k.validate(),
            MarketEvent::Order(o) => o.validate(),
            MarketEvent::Trade(t) => t.validate(),
            MarketEvent::Balance(b) => b.validate(),
            MarketEvent::Error(_) => Ok(()),
        }
    }
}

impl From<MiniTicker> for MarketEvent {
    fn from(t: MiniTicker) -> Self {
        MarketEvent::Ticker(t)
    }
}

impl From<Kline> for MarketEvent {
    fn from(k: Kline) -> Self {
        MarketEvent::Kline(k)
    }
}

impl From<Order> for MarketEvent {
    fn from(o: Order) -> Self {
        MarketEvent::Order(o)
    }
}

impl From<AccountTrade> for MarketEvent {
    fn from(t: AccountTrade) -> Self {
        MarketEvent::Trade(t)
    }
}

impl From<Balance> for MarketEvent {
    fn from(b: Balance) -> Self {
        MarketEvent::Balance(b)
    }
}
