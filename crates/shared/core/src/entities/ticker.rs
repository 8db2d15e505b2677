use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{EventTimed, ValidationError};
use crate::keys::Symbol;
use crate::values::{Price, Quantity, Timestamp};

/// Rolling 24h mini ticker for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniTicker {
    pub symbol: Symbol,
    pub event_time: Timestamp,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    /// Last traded price
    pub close: Price,
    pub volume: Quantity,
    pub quote_volume: Quantity,
}

impl MiniTicker {
    /// Ticker carrying only a last price (open/high/low collapse to it)
    pub fn last_price(symbol: impl Into<Symbol>, close: Price, event_time: Timestamp) -> Self {
        Self {
            symbol: symbol.into(),
            event_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.close <= Decimal::ZERO {
            return Err(ValidationError::NonPositive("close"));
        }
        if self.low > self.high {
            return Err(ValidationError::InvertedRange("low above high"));
        }
        if self.volume < Decimal::ZERO || self.quote_volume < Decimal::ZERO {
            return Err(ValidationError::NegativeValue("volume"));
        }
        Ok(())
    }
}

impl EventTimed for MiniTicker {
    fn event_time(&self) -> Timestamp {
        self.event_time
    }
}
