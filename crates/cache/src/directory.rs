use dashmap::DashMap;
use std::sync::Arc;
use strata_ports::BackingStore;
use tokio::sync::OnceCell;

use crate::error::CacheResult;
use crate::merge::Mergeable;
use crate::partition::{CacheValue, PartitionCache, PartitionKey, PartitionOptions, TrimFn};

type Slot<K, T> = Arc<OnceCell<PartitionCache<K, T>>>;

/// Lazily activated partitions of one value type, keyed by partition key
///
/// The first caller for a key runs the activation; concurrent callers for the
/// same key wait on it instead of loading twice. A failed activation leaves
/// the slot empty so the next call retries.
pub struct PartitionDirectory<K, T> {
    inner: Arc<DirectoryInner<K, T>>,
}

struct DirectoryInner<K, T> {
    name: String,
    slots: DashMap<K, Slot<K, T>>,
    store: Arc<dyn BackingStore<K, T>>,
    options: PartitionOptions,
    trim: Option<TrimFn<T>>,
}

impl<K, T> Clone for PartitionDirectory<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: PartitionKey, T: CacheValue> PartitionDirectory<K, T> {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn BackingStore<K, T>>,
        options: PartitionOptions,
    ) -> Self {
        Self::with_trim(name.into(), store, options, None)
    }

    fn with_trim(
        name: String,
        store: Arc<dyn BackingStore<K, T>>,
        options: PartitionOptions,
        trim: Option<TrimFn<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                name,
                slots: DashMap::new(),
                store,
                options,
                trim,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the partition for `key`, activating it on first access
    pub async fn get_or_activate(&self, key: &K) -> CacheResult<PartitionCache<K, T>> {
        // Clone the slot out so no map shard lock is held across the load
        let slot = self
            .inner
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let cache = slot
            .get_or_try_init(|| {
                PartitionCache::start(
                    key.clone(),
                    Arc::clone(&self.inner.store),
                    self.inner.options.clone(),
                    self.inner.trim,
                )
            })
            .await
            .inspect_err(|e| log::warn!("[{}] {}", self.inner.name, e))?;

        Ok(cache.clone())
    }

    /// Get an already active partition
    pub fn get(&self, key: &K) -> Option<PartitionCache<K, T>> {
        self.inner
            .slots
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Keys of active partitions
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Number of active partitions
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down every active partition and forget them
    pub async fn shutdown_all(&self) {
        let caches: Vec<_> = self
            .inner
            .slots
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect();
        self.inner.slots.clear();

        for cache in &caches {
            cache.shutdown().await;
        }
        log::info!("[{}] {} partitions shut down", self.inner.name, caches.len());
    }
}

impl<K: PartitionKey, T: Mergeable> PartitionDirectory<K, T> {
    /// Directory whose partitions enforce `options.retention`
    pub fn bounded(
        name: impl Into<String>,
        store: Arc<dyn BackingStore<K, T>>,
        options: PartitionOptions,
    ) -> Self {
        Self::with_trim(name.into(), store, options, Some(T::retain_within as TrimFn<T>))
    }
}
