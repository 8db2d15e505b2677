//! Error types for the runner crate

use strata_cache::CacheError;
use strata_gateway::GatewayError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Gave up reconnecting after {attempts} attempts: {last}")]
    ReconnectExhausted {
        attempts: u32,
        #[source]
        last: GatewayError,
    },

    #[error("No active partition for {0}")]
    UnknownPartition(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
