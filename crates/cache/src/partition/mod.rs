//! Authoritative single-writer cache for one partition
//!
//! Each partition is an actor task that owns the waiter set and is the only
//! writer of the current entry. `PartitionCache` is the cloneable handle:
//!
//! ```text
//!   get() ─────────────► ArcSwap<CachedEntry>  (lock-free snapshot)
//!                               ▲
//!   set()/merge() ──┐           │ store
//!   wait_for_change ┼──► mpsc ──► PartitionActor ──► BackingStore::persist
//!   stats()         ┘               │
//!                                   └──► parked oneshot waiters
//! ```

mod actor;
mod command;

pub(crate) use command::PartitionCommand;
pub use command::{MergeFn, PartitionStats, TrimFn};

use arc_swap::ArcSwap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use strata_ports::BackingStore;
use tokio::sync::{mpsc, oneshot};

use crate::config::Retention;
use crate::error::{CacheError, CacheResult};
use crate::merge::Mergeable;
use crate::version::{CachedEntry, SharedEntry, VersionToken};
use actor::PartitionActor;

/// Anything that can scope a partition
pub trait PartitionKey: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static {}

impl<K> PartitionKey for K where K: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static
{}

/// Anything a partition can hold
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// Whether writes go to the backing store before they are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    #[default]
    WriteThrough,
    /// Load once on activation, never persist
    LoadOnly,
}

/// Configuration for one partition
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub persistence: Persistence,
    /// Mailbox depth of the partition actor
    pub command_buffer_size: usize,
    /// Enforced only by partitions activated with a trim rule
    pub retention: Retention,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            persistence: Persistence::WriteThrough,
            command_buffer_size: 1024,
            retention: Retention::default(),
        }
    }
}

impl PartitionOptions {
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }
}

/// Handle to one partition
pub struct PartitionCache<K, T> {
    key: Arc<K>,
    sender: mpsc::Sender<PartitionCommand<T>>,
    current: Arc<ArcSwap<CachedEntry<T>>>,
    trim: Option<TrimFn<T>>,
}

impl<K, T> Clone for PartitionCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            sender: self.sender.clone(),
            current: Arc::clone(&self.current),
            trim: self.trim,
        }
    }
}

impl<K: PartitionKey, T: CacheValue> PartitionCache<K, T> {
    /// Load the initial value and start the partition actor
    ///
    /// A load failure leaves nothing running; the caller decides whether to retry.
    pub async fn activate(
        key: K,
        store: Arc<dyn BackingStore<K, T>>,
        options: PartitionOptions,
    ) -> CacheResult<Self> {
        Self::start(key, store, options, None).await
    }

    pub(crate) async fn start(
        key: K,
        store: Arc<dyn BackingStore<K, T>>,
        options: PartitionOptions,
        trim: Option<TrimFn<T>>,
    ) -> CacheResult<Self> {
        let mut initial = store
            .load(&key)
            .await
            .map_err(|source| CacheError::Activation {
                key: key.to_string(),
                source,
            })?;

        log::debug!(
            "Partition {} loaded from {} ({})",
            key,
            store.name(),
            if initial.is_some() { "populated" } else { "empty" }
        );
        if let (Some(trim), Some(value)) = (trim, initial.as_mut()) {
            let evicted = trim(value, &options.retention);
            if evicted > 0 {
                log::debug!("Partition {} evicted {} loaded entries", key, evicted);
            }
        }

        let current = Arc::new(ArcSwap::from_pointee(CachedEntry::initial(initial)));
        let (sender, receiver) = mpsc::channel(options.command_buffer_size.max(1));

        let actor = PartitionActor::new(
            key.clone(),
            receiver,
            store,
            &options,
            trim,
            Arc::clone(&current),
        );
        tokio::spawn(actor.run());

        Ok(Self {
            key: Arc::new(key),
            sender,
            current,
            trim,
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Current entry. Never blocks.
    pub fn get(&self) -> SharedEntry<T> {
        self.current.load_full()
    }

    /// Current value, `None` if the partition was never populated
    pub fn try_get(&self) -> Option<T> {
        self.current.load().value.clone()
    }

    pub fn version(&self) -> VersionToken {
        self.current.load().version
    }

    /// Long-poll for an entry newer than `known`
    ///
    /// Returns immediately when `known` is not the current version. Otherwise
    /// parks until the next commit. `None` means the timeout elapsed (or the
    /// partition shut down) with nothing new; poll again.
    pub async fn wait_for_change(
        &self,
        known: VersionToken,
        timeout: Duration,
    ) -> Option<SharedEntry<T>> {
        let current = self.current.load_full();
        if current.version != known {
            return Some(current);
        }

        let park = async {
            let (response, rx) = oneshot::channel();
            self.sender
                .send(PartitionCommand::WaitForChange { known, response })
                .await
                .ok()?;
            rx.await.ok()
        };

        tokio::time::timeout(timeout, park).await.ok().flatten()
    }

    /// Replace the value, bump the version and wake parked pollers
    ///
    /// With write-through persistence the store write happens first; on
    /// failure nothing is published.
    pub async fn set(&self, value: T) -> CacheResult<SharedEntry<T>> {
        let (response, rx) = oneshot::channel();
        self.send(PartitionCommand::Set { value, response }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Fold `value` into the current value with an explicit merge function
    ///
    /// A merge that changes nothing does not bump the version.
    pub async fn merge_with(&self, value: T, merge: MergeFn<T>) -> CacheResult<SharedEntry<T>> {
        let (response, rx) = oneshot::channel();
        self.send(PartitionCommand::Merge {
            value,
            merge,
            response,
        })
        .await?;
        rx.await.map_err(|_| self.closed())?
    }

    pub async fn stats(&self) -> CacheResult<PartitionStats> {
        let (response, rx) = oneshot::channel();
        self.send(PartitionCommand::Stats { response }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Stop the actor. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PartitionCommand::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether commits are trimmed to a retention
    pub fn is_bounded(&self) -> bool {
        self.trim.is_some()
    }

    async fn send(&self, cmd: PartitionCommand<T>) -> CacheResult<()> {
        self.sender.send(cmd).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> CacheError {
        CacheError::PartitionClosed(self.key.to_string())
    }
}

impl<K: PartitionKey, T: Mergeable> PartitionCache<K, T> {
    /// Like `activate`, but every committed value is bounded by
    /// `options.retention` through the value type's own eviction rule
    pub async fn activate_bounded(
        key: K,
        store: Arc<dyn BackingStore<K, T>>,
        options: PartitionOptions,
    ) -> CacheResult<Self> {
        Self::start(key, store, options, Some(T::retain_within as TrimFn<T>)).await
    }

    /// Fold `value` in using the value type's own merge rule
    pub async fn merge(&self, value: T) -> CacheResult<SharedEntry<T>> {
        self.merge_with(value, T::merge_from).await
    }
}

impl<K: fmt::Debug, T> fmt::Debug for PartitionCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.load();
        f.debug_struct("PartitionCache")
            .field("key", &self.key)
            .field("serial", &current.serial)
            .field("version", &current.version)
            .finish()
    }
}
