//! Error types for the gateway crate

use strata_ports::SourceError;
use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    Send(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Gateway-level errors (ingestion pump)
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Ingestion source {source_name} failed: {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceError,
    },
}

impl GatewayError {
    /// The source connection is gone; the owner should reconnect
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            GatewayError::Source {
                error: SourceError::Disconnected(_),
                ..
            } | GatewayError::Transport(TransportError::ChannelClosed)
        )
    }
}
