use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{EventTimed, ValidationError};
use crate::keys::Asset;
use crate::values::{Quantity, Timestamp};

/// Account balance for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: Asset,
    pub free: Quantity,
    pub locked: Quantity,
    pub updated_at: Timestamp,
}

impl Balance {
    pub fn new(
        asset: impl Into<Asset>,
        free: Quantity,
        locked: Quantity,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            asset: asset.into(),
            free,
            locked,
            updated_at,
        }
    }

    pub fn total(&self) -> Quantity {
        self.free + self.locked
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if self.free < Decimal::ZERO || self.locked < Decimal::ZERO {
            return Err(ValidationError::NegativeValue("balance"));
        }
        Ok(())
    }
}

impl EventTimed for Balance {
    fn event_time(&self) -> Timestamp {
        self.updated_at
    }
}
