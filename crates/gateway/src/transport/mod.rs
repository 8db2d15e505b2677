//! Transport abstraction layer
//!
//! Exchange streams fan out: one connection, any number of readers. A reader
//! that falls behind loses intermediate messages instead of stalling the
//! stream, so `publish` reports how many readers a message reached and each
//! `Subscriber` counts what it skipped. Messages stay serde-serializable so a
//! networked transport can sit behind the same traits.

pub mod channel;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

/// Publisher - fans messages out to every current subscriber
#[async_trait]
pub trait Publisher<M>: Send + Sync
where
    M: Serialize + Send + Sync,
{
    /// Publish a message, returning how many subscribers it reached
    ///
    /// Fails with `ChannelClosed` when nobody is subscribed.
    async fn publish(&self, msg: &M) -> Result<usize, TransportError>;
}

/// Subscriber - one reader of a fan-out stream
#[async_trait]
pub trait Subscriber<M>: Send
where
    M: DeserializeOwned + Send,
{
    /// Wait for the next message, skipping over any lost to lag
    async fn next(&mut self) -> Result<M, TransportError>;

    /// Next message if one is already buffered
    fn try_next(&mut self) -> Result<Option<M>, TransportError>;

    /// Messages lost because this subscriber fell behind
    fn skipped(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_publisher_object_safe(_: &dyn Publisher<String>) {}
    fn _assert_subscriber_object_safe(_: &mut dyn Subscriber<String>) {}
}
