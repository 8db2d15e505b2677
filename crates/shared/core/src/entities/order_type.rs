use serde::{Deserialize, Serialize};

/// Order types reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at current market price
    Market,
    /// Execute at specified price or better
    Limit,
    /// Limit order rejected if it would take liquidity
    LimitMaker,
    /// Market order triggered when price reaches stop price
    StopLoss,
    /// Limit order triggered when price reaches stop price
    StopLossLimit,
}

impl OrderType {
    /// Returns true if the order rests on the book at a limit price
    pub fn has_limit_price(&self) -> bool {
        matches!(
            self,
            OrderType::Limit | OrderType::LimitMaker | OrderType::StopLossLimit
        )
    }
}
