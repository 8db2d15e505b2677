use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use strata_ports::{BackingStore, StoreError, StoreResult};

/// In-memory backing store
///
/// Thread-safe storage using DashMap. Suitable for simulation and testing;
/// failures can be switched on to exercise activation retry and
/// write-through rejection.
pub struct MemoryStore<K, T> {
    values: Arc<DashMap<K, T>>,
    fail_loads: Arc<AtomicBool>,
    fail_persists: Arc<AtomicBool>,
    loads: Arc<AtomicU64>,
    persists: Arc<AtomicU64>,
}

impl<K: Eq + Hash, T: Clone> MemoryStore<K, T> {
    pub fn new() -> Self {
        Self {
            values: Arc::new(DashMap::new()),
            fail_loads: Arc::new(AtomicBool::new(false)),
            fail_persists: Arc::new(AtomicBool::new(false)),
            loads: Arc::new(AtomicU64::new(0)),
            persists: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Put a value in place without counting it as a persist
    pub fn seed(&self, key: K, value: T) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<T> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of load attempts, failed ones included
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of successful persists
    pub fn persist_count(&self) -> u64 {
        self.persists.load(Ordering::Relaxed)
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_persists(&self, fail: bool) {
        self.fail_persists.store(fail, Ordering::Relaxed);
    }
}

impl<K: Eq + Hash, T: Clone> Default for MemoryStore<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Clone for MemoryStore<K, T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            fail_loads: Arc::clone(&self.fail_loads),
            fail_persists: Arc::clone(&self.fail_persists),
            loads: Arc::clone(&self.loads),
            persists: Arc::clone(&self.persists),
        }
    }
}

#[async_trait]
impl<K, T> BackingStore<K, T> for MemoryStore<K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    async fn load(&self, key: &K) -> StoreResult<Option<T>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(self.get(key))
    }

    async fn persist(&self, key: &K, value: &T) -> StoreResult<()> {
        if self.fail_persists.load(Ordering::Relaxed) {
            return Err(StoreError::Rejected("memory store read-only".to_string()));
        }
        self.values.insert(key.clone(), value.clone());
        self.persists.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "MemoryStore"
    }
}
