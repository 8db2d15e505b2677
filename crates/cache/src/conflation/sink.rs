use async_trait::async_trait;

use crate::error::CacheResult;
use crate::merge::Mergeable;
use crate::partition::{CacheValue, PartitionCache, PartitionKey};

/// Downstream of a conflation buffer
#[async_trait]
pub trait ConflationSink<T: Send + 'static>: Send + Sync + 'static {
    async fn deliver(&self, item: T) -> CacheResult<()>;
}

/// Fold each flushed batch into a partition with its merge rule
pub struct MergeSink<K, T>(pub PartitionCache<K, T>);

#[async_trait]
impl<K: PartitionKey, T: Mergeable> ConflationSink<T> for MergeSink<K, T> {
    async fn deliver(&self, item: T) -> CacheResult<()> {
        self.0.merge(item).await.map(|_| ())
    }
}

/// Write each flushed value to a partition as is
pub struct SetSink<K, T>(pub PartitionCache<K, T>);

#[async_trait]
impl<K: PartitionKey, T: CacheValue> ConflationSink<T> for SetSink<K, T> {
    async fn deliver(&self, item: T) -> CacheResult<()> {
        self.0.set(item).await.map(|_| ())
    }
}
