use async_trait::async_trait;
use strata_core::MarketEvent;

use crate::error::SourceError;

/// Port for the stream of decoded exchange events
///
/// Wire decoding, signing and reconnect backoff live behind this trait.
#[async_trait]
pub trait IngestionSource: Send {
    /// Wait for the next event.
    ///
    /// - `Ok(Some(event))`: an event arrived
    /// - `Ok(None)`: the stream ended cleanly
    /// - `Err(e)` with `e.is_fatal()`: the transport dropped; the owner reconnects
    async fn next_event(&mut self) -> Result<Option<MarketEvent>, SourceError>;

    /// Get the source's name for logging
    fn name(&self) -> &str {
        "IngestionSource"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure the trait is object-safe
    fn _assert_source_object_safe(_: &mut dyn IngestionSource) {}
}
