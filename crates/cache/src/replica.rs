//! Local read mirror of one partition
//!
//! A replica answers reads from its own state and keeps that state fresh with
//! a background long-poll loop against the partition. Writes go through to
//! the partition first and are then adopted locally, so a writer always reads
//! back what it wrote even before the next poll.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::CacheResult;
use crate::merge::Mergeable;
use crate::partition::{CacheValue, MergeFn, PartitionCache, PartitionKey};
use crate::version::{CachedEntry, VersionToken};

/// Configuration for a replica poll loop
#[derive(Debug, Clone)]
pub struct ReplicaOptions {
    /// Pause after applying a change before polling again
    pub poll_period: Duration,
    /// Bound on one long-poll, so cancellation is never stuck behind it
    pub poll_timeout: Duration,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(10),
        }
    }
}

/// What applying a polled entry did to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    /// Same version as already held
    Unchanged,
    /// Older serial than already held
    Stale,
    Merged,
    /// Entry from a different activation; local state replaced wholesale
    Restarted,
}

#[derive(Debug)]
struct ReplicaState<T> {
    last_version: VersionToken,
    last_serial: u64,
    epoch: VersionToken,
    local: Option<T>,
}

impl<T: Clone> ReplicaState<T> {
    fn seeded(entry: &CachedEntry<T>) -> Self {
        Self {
            last_version: entry.version,
            last_serial: entry.serial,
            epoch: entry.epoch,
            local: entry.value.clone(),
        }
    }

    fn apply(&mut self, entry: &CachedEntry<T>, merge: MergeFn<T>) -> Applied {
        if entry.version == self.last_version {
            return Applied::Unchanged;
        }
        if entry.epoch != self.epoch {
            *self = Self::seeded(entry);
            return Applied::Restarted;
        }
        if entry.serial <= self.last_serial {
            return Applied::Stale;
        }

        if let Some(incoming) = entry.value.clone() {
            match self.local.as_mut() {
                Some(local) => {
                    merge(local, incoming);
                }
                None => self.local = Some(incoming),
            }
        }
        self.last_version = entry.version;
        self.last_serial = entry.serial;
        Applied::Merged
    }

    /// Take an acknowledged write as the local value, unless already past it
    fn adopt(&mut self, entry: &CachedEntry<T>) {
        if entry.epoch == self.epoch && entry.serial <= self.last_serial {
            return;
        }
        *self = Self::seeded(entry);
    }
}

/// Eventually consistent mirror of one `PartitionCache`
///
/// Cloning shares the same mirror and poll loop. The loop stops when the
/// owner's token is cancelled, when `stop` is called, when the last clone is
/// dropped, or when the partition shuts down.
pub struct ReadReplica<K, T> {
    inner: Arc<ReplicaInner<K, T>>,
}

struct ReplicaInner<K, T> {
    cache: PartitionCache<K, T>,
    state: Arc<RwLock<ReplicaState<T>>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<K, T> Drop for ReplicaInner<K, T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<K, T> Clone for ReadReplica<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: PartitionKey, T: Mergeable> ReadReplica<K, T> {
    /// Mirror `cache`, merging with the value type's own rule
    pub fn spawn(
        cache: PartitionCache<K, T>,
        options: ReplicaOptions,
        cancel: &CancellationToken,
    ) -> Self {
        Self::with_merge(cache, options, cancel, T::merge_from)
    }

    /// Fold `value` into the partition, then adopt the result locally
    pub async fn merge(&self, value: T) -> CacheResult<()> {
        let entry = self.inner.cache.merge(value).await?;
        self.inner.state.write().adopt(&entry);
        Ok(())
    }
}

impl<K: PartitionKey, T: CacheValue> ReadReplica<K, T> {
    /// Mirror `cache` with an explicit merge function
    ///
    /// Entries of a bounded partition replace local state instead: merging
    /// them would bring back whatever the partition evicted.
    pub fn with_merge(
        cache: PartitionCache<K, T>,
        options: ReplicaOptions,
        cancel: &CancellationToken,
        merge: MergeFn<T>,
    ) -> Self {
        let merge = if cache.is_bounded() {
            replace::<T> as MergeFn<T>
        } else {
            merge
        };
        let state = Arc::new(RwLock::new(ReplicaState::seeded(&cache.get())));
        let cancel = cancel.child_token();

        let task = tokio::spawn(poll_loop(
            cache.clone(),
            Arc::clone(&state),
            merge,
            options,
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(ReplicaInner {
                cache,
                state,
                cancel,
                task,
            }),
        }
    }

    /// Local value. Never touches the partition.
    pub fn get(&self) -> Option<T> {
        self.inner.state.read().local.clone()
    }

    /// Borrow the local value without cloning it
    pub fn read<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let state = self.inner.state.read();
        f(state.local.as_ref())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.read().local.is_some()
    }

    pub fn last_serial(&self) -> u64 {
        self.inner.state.read().last_serial
    }

    pub fn last_version(&self) -> VersionToken {
        self.inner.state.read().last_version
    }

    /// Write through to the partition, then adopt the written value locally
    pub async fn set(&self, value: T) -> CacheResult<()> {
        let entry = self.inner.cache.set(value).await?;
        self.inner.state.write().adopt(&entry);
        Ok(())
    }

    pub fn cache(&self) -> &PartitionCache<K, T> {
        &self.inner.cache
    }

    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.inner.task.is_finished()
    }
}

fn replace<T>(local: &mut T, incoming: T) -> bool {
    *local = incoming;
    true
}

async fn poll_loop<K: PartitionKey, T: CacheValue>(
    cache: PartitionCache<K, T>,
    state: Arc<RwLock<ReplicaState<T>>>,
    merge: MergeFn<T>,
    options: ReplicaOptions,
    cancel: CancellationToken,
) {
    log::debug!("Replica of {} polling", cache.key());

    loop {
        let known = state.read().last_version;

        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = cache.wait_for_change(known, options.poll_timeout) => polled,
        };

        match polled {
            Some(entry) => {
                let applied = state.write().apply(&entry, merge);
                if applied == Applied::Restarted {
                    log::info!(
                        "Replica of {} detected partition restart, resynced at serial {}",
                        cache.key(),
                        entry.serial
                    );
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(options.poll_period) => {}
                }
            }
            None if cache.is_closed() => {
                log::info!("Replica of {} stopping: partition closed", cache.key());
                return;
            }
            // Nothing new within the poll timeout
            None => {}
        }
    }

    log::debug!("Replica of {} cancelled", cache.key());
}
