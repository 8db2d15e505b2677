use async_trait::async_trait;
use strata_core::MarketEvent;
use strata_ports::{IngestionSource, SourceError};

use crate::error::TransportError;
use crate::transport::Subscriber;
use crate::transport::channel::ChannelSubscriber;

/// Ingestion source reading decoded events off the in-process transport
///
/// A closed channel is a dropped connection. Lag is skipped over: the
/// conflation stage only ever forwards the latest state anyway.
pub struct ChannelSource {
    name: String,
    subscriber: ChannelSubscriber<MarketEvent>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>, subscriber: ChannelSubscriber<MarketEvent>) -> Self {
        Self {
            name: name.into(),
            subscriber,
        }
    }

    /// Events lost to lag so far
    pub fn skipped(&self) -> u64 {
        self.subscriber.skipped()
    }
}

#[async_trait]
impl IngestionSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, SourceError> {
        match self.subscriber.next().await {
            Ok(event) => Ok(Some(event)),
            Err(TransportError::ChannelClosed) => {
                Err(SourceError::Disconnected(format!("{} channel closed", self.name)))
            }
            Err(e) => Err(SourceError::Transport(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
