mod balance;
mod kline;
mod order;
mod order_status;
mod order_type;
mod side;
mod ticker;
mod trade;

pub use balance::Balance;
pub use kline::Kline;
pub use order::{Order, OrderId};
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use side::Side;
pub use ticker::MiniTicker;
pub use trade::{AccountTrade, TradeId};
