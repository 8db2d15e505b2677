use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderId;
use crate::events::{EventTimed, ValidationError};
use crate::keys::Symbol;
use crate::values::{Price, Quantity, Timestamp};

/// Exchange-assigned trade identifier
pub type TradeId = i64;

/// A fill against one of the account's own orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTrade {
    pub symbol: Symbol,
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub price: Price,
    pub qty: Quantity,
    pub commission: Quantity,
    pub is_buyer: bool,
    pub time: Timestamp,
}

impl AccountTrade {
    /// Returns the notional value of the trade (price * quantity)
    pub fn notional(&self) -> Price {
        self.price * self.qty
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.price <= Decimal::ZERO {
            return Err(ValidationError::NonPositive("price"));
        }
        if self.qty < Decimal::ZERO || self.commission < Decimal::ZERO {
            return Err(ValidationError::NegativeValue("quantity"));
        }
        Ok(())
    }
}

impl EventTimed for AccountTrade {
    fn event_time(&self) -> Timestamp {
        self.time
    }
}
