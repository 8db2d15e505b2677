use async_trait::async_trait;

use crate::error::StoreResult;

/// Port for the durable store behind a cache partition
///
/// The cache is a consistency layer over this store, not a database itself:
/// - `load` runs once when a partition activates
/// - `persist` runs before a write-through partition publishes a new value
///
/// Implementations must tolerate `persist` being retried with the same value.
#[async_trait]
pub trait BackingStore<K, T>: Send + Sync
where
    K: Send + Sync,
    T: Send + Sync,
{
    /// Load the durable value for a key. `Ok(None)` means nothing stored yet.
    async fn load(&self, key: &K) -> StoreResult<Option<T>>;

    /// Durably write the value for a key
    async fn persist(&self, key: &K, value: &T) -> StoreResult<()>;

    /// Get the store's name for logging
    fn name(&self) -> &str {
        "BackingStore"
    }
}
