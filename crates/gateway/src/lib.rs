//! Strata Gateway
//!
//! Gateway layer for the Strata cache. Provides:
//! - Transport abstraction (tokio channels, with traits for future transports)
//! - `ChannelSource`: the in-process transport as an ingestion source
//! - `IngestionPump`: validates decoded events and routes them by partition
//!   key into conflation buffers
//!
//! ## Architecture
//!
//! ```text
//! Exchange feed (simulator)
//!         │ ChannelPublisher<MarketEvent>
//!    ┌────▼────────┐
//!    │ChannelSource│
//!    └────┬────────┘
//!    ┌────▼────────┐   ticker:SYM  kline:SYM@1m  orders:SYM
//!    │IngestionPump├──► trades:SYM  balance:ASSET
//!    └─────────────┘   (ConflationBuffer per partition)
//! ```

pub mod error;
pub mod pump;
pub mod routes;
pub mod source;
pub mod transport;

// Re-export commonly used types
pub use error::{GatewayError, TransportError};
pub use pump::{IngestionPump, PumpExit, PumpStats};
pub use routes::{RouteOutcome, RouteTable};
pub use source::ChannelSource;
pub use transport::{
    Publisher, Subscriber,
    channel::{ChannelPublisher, ChannelSubscriber},
};
