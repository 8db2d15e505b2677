use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{EventTimed, ValidationError};
use crate::keys::{KlineInterval, KlineKey, Symbol};
use crate::values::{Price, Quantity, Timestamp};

/// One candlestick bar; identified within its partition by `open_time`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol: Symbol,
    pub interval: KlineInterval,
    pub open_time: Timestamp,
    pub close_time: Timestamp,
    /// Exchange time this version of the bar was emitted
    pub event_time: Timestamp,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    /// True once the bar's window has ended and it will not change again
    pub is_closed: bool,
}

impl Kline {
    /// Partition key this bar belongs to
    pub fn key(&self) -> KlineKey {
        KlineKey::new(self.symbol.clone(), self.interval)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.close_time < self.open_time {
            return Err(ValidationError::InvertedRange("close_time before open_time"));
        }
        if self.low > self.high {
            return Err(ValidationError::InvertedRange("low above high"));
        }
        if self.open <= Decimal::ZERO || self.close <= Decimal::ZERO {
            return Err(ValidationError::NonPositive("price"));
        }
        if self.volume < Decimal::ZERO {
            return Err(ValidationError::NegativeValue("volume"));
        }
        Ok(())
    }
}

impl EventTimed for Kline {
    fn event_time(&self) -> Timestamp {
        self.event_time
    }
}
