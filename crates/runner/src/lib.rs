//! Strata Runner
//!
//! Orchestrates the cache as a running process:
//!
//! - **Config**: typed JSON configuration with defaults
//! - **Bootstrap**: explicit wiring of partitions, conflation buffers, routes
//! - **Event Feed**: seedable simulated exchange stream
//! - **Reconnect**: restarts the ingestion pump after a dropped connection
//! - **Market View**: replica-backed reads for strategy executors
//! - **Service**: the whole thing started, reported on and shut down
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────┐
//!   │ FeedSimulator │
//!   └───────┬───────┘
//!           │ FeedConnector::connect()
//!   ┌───────▼───────┐   run_with_reconnect
//!   │ IngestionPump │
//!   └───────┬───────┘
//!           │ route by partition key
//!   ┌───────▼────────────┐
//!   │ ConflationBuffers  │ one per partition
//!   └───────┬────────────┘
//!           │ merge
//!   ┌───────▼────────────┐   long-poll    ┌────────────┐
//!   │ PartitionCaches    ├───────────────►│ MarketView │
//!   │ (Directories)      │                │ (replicas) │
//!   └───────┬────────────┘                └────────────┘
//!           │ write-through
//!        Stores
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod event_feed;
pub mod reconnect;
pub mod service;
pub mod view;

pub use bootstrap::{Bootstrap, Directories, Stores, activate};
pub use config::{
    ConfigError, FeedConfig, RetryConfig, StrataConfig, load_config, load_config_from_str,
    load_default_config,
};
pub use error::RunnerError;
pub use event_feed::{FeedConnector, FeedSimulator};
pub use reconnect::run_with_reconnect;
pub use service::StrataService;
pub use view::MarketView;
