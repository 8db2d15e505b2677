//! Strata Core Domain
//!
//! Pure domain types for the Strata market-state cache.
//! This crate contains no async, no I/O, and is 100% unit testable.
//!
//! Three groups of types live here:
//! - **Keys**: partition identifiers (`Symbol`, `Asset`, `KlineKey`)
//! - **Entities**: the market and account state that partitions hold
//! - **Events**: decoded exchange events flowing into the ingestion pump

pub mod entities;
pub mod events;
pub mod keys;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    AccountTrade, Balance, Kline, MiniTicker, Order, OrderId, OrderStatus, OrderType, Side,
    TradeId,
};
pub use events::{ErrorFrame, EventKind, EventTimed, MarketEvent, ValidationError};
pub use keys::{Asset, KlineInterval, KlineKey, ParseIntervalError, Symbol};
pub use values::{Price, Quantity, Timestamp};
