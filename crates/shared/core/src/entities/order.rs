use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderStatus, OrderType, Side};
use crate::events::{EventTimed, ValidationError};
use crate::keys::Symbol;
use crate::values::{Price, Quantity, Timestamp};

/// Exchange-assigned order identifier
pub type OrderId = i64;

/// Latest known state of one account order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: Symbol,
    pub order_id: OrderId,
    pub client_order_id: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price, zero for market orders
    pub price: Price,
    pub original_qty: Quantity,
    pub executed_qty: Quantity,
    pub status: OrderStatus,
    /// Exchange time of the last change to this order
    pub updated_at: Timestamp,
}

impl Order {
    /// Create a freshly accepted order
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<Symbol>,
        order_id: OrderId,
        client_order_id: impl Into<String>,
        side: Side,
        order_type: OrderType,
        price: Price,
        original_qty: Quantity,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            order_id,
            client_order_id: client_order_id.into(),
            side,
            order_type,
            price,
            original_qty,
            executed_qty: Decimal::ZERO,
            status: OrderStatus::New,
            updated_at,
        }
    }

    /// Returns a copy with a new fill level and status
    pub fn with_execution(
        &self,
        executed_qty: Quantity,
        status: OrderStatus,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            executed_qty,
            status,
            updated_at,
            ..self.clone()
        }
    }

    /// Returns remaining quantity to be filled
    pub fn remaining_qty(&self) -> Quantity {
        self.original_qty - self.executed_qty
    }

    /// Returns true if the order still works on the book
    pub fn is_open(&self) -> bool {
        self.status.is_active()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.price < Decimal::ZERO {
            return Err(ValidationError::NegativeValue("price"));
        }
        if self.order_type.has_limit_price() && self.price.is_zero() {
            return Err(ValidationError::NonPositive("price"));
        }
        if self.original_qty < Decimal::ZERO || self.executed_qty < Decimal::ZERO {
            return Err(ValidationError::NegativeValue("quantity"));
        }
        if self.executed_qty > self.original_qty {
            return Err(ValidationError::Overfilled {
                executed: self.executed_qty,
                original: self.original_qty,
            });
        }
        Ok(())
    }
}

impl EventTimed for Order {
    fn event_time(&self) -> Timestamp {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::new(
            "BTCUSDT",
            42,
            "client-42",
            Side::Buy,
            OrderType::Limit,
            dec!(50000),
            dec!(2),
            Utc::now(),
        )
    }

    #[test]
    fn test_remaining_qty() {
        let filled = order().with_execution(dec!(0.5), OrderStatus::PartiallyFilled, Utc::now());
        assert_eq!(filled.remaining_qty(), dec!(1.5));
        assert!(filled.is_open());
    }

    #[test]
    fn test_validate_rejects_overfill() {
        let bad = order().with_execution(dec!(3), OrderStatus::Filled, Utc::now());
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::Overfilled { .. })
        ));
        assert!(order().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unpriced_limit() {
        let mut bad = order();
        bad.price = Decimal::ZERO;
        assert_eq!(bad.validate(), Err(ValidationError::NonPositive("price")));

        bad.order_type = OrderType::Market;
        assert!(bad.validate().is_ok());
    }
}
