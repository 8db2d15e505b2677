use arc_swap::ArcSwap;
use log::{debug, info, warn};
use std::sync::Arc;
use strata_ports::BackingStore;
use tokio::sync::{mpsc, oneshot};

use super::command::{MergeFn, PartitionCommand, PartitionStats, TrimFn};
use super::{CacheValue, PartitionKey, PartitionOptions, Persistence};
use crate::config::Retention;
use crate::error::{CacheError, CacheResult};
use crate::version::{CachedEntry, SharedEntry, VersionToken};

/// Single writer for one partition
///
/// Owns the waiter set outright. The current entry is shared with handles
/// through `ArcSwap` so plain reads never queue behind writes, but only this
/// task ever stores into it.
pub(super) struct PartitionActor<K, T> {
    key: K,
    receiver: mpsc::Receiver<PartitionCommand<T>>,
    store: Arc<dyn BackingStore<K, T>>,
    persistence: Persistence,
    retention: Retention,
    trim: Option<TrimFn<T>>,
    current: Arc<ArcSwap<CachedEntry<T>>>,
    waiters: Vec<oneshot::Sender<SharedEntry<T>>>,
    writes_committed: u64,
    unchanged_merges: u64,
    persist_failures: u64,
    evicted: u64,
}

impl<K: PartitionKey, T: CacheValue> PartitionActor<K, T> {
    pub(super) fn new(
        key: K,
        receiver: mpsc::Receiver<PartitionCommand<T>>,
        store: Arc<dyn BackingStore<K, T>>,
        options: &PartitionOptions,
        trim: Option<TrimFn<T>>,
        current: Arc<ArcSwap<CachedEntry<T>>>,
    ) -> Self {
        Self {
            key,
            receiver,
            store,
            persistence: options.persistence,
            retention: options.retention,
            trim,
            current,
            waiters: Vec::new(),
            writes_committed: 0,
            unchanged_merges: 0,
            persist_failures: 0,
            evicted: 0,
        }
    }

    /// Main event loop - processes commands sequentially
    pub(super) async fn run(mut self) {
        debug!("Partition {} started", self.key);

        while let Some(cmd) = self.receiver.recv().await {
            if !self.process_command(cmd).await {
                break;
            }
        }

        // Dropping the senders wakes every parked poller with a closed channel
        let released = self.waiters.len();
        self.waiters.clear();
        info!(
            "Partition {} stopped after {} writes ({} pollers released)",
            self.key, self.writes_committed, released
        );
    }

    /// Process a single command, returns false if should shutdown
    async fn process_command(&mut self, cmd: PartitionCommand<T>) -> bool {
        match cmd {
            PartitionCommand::WaitForChange { known, response } => {
                self.handle_wait(known, response);
            }

            PartitionCommand::Set { value, response } => {
                let result = self.commit(value).await;
                let _ = response.send(result);
            }

            PartitionCommand::Merge {
                value,
                merge,
                response,
            } => {
                let result = self.handle_merge(value, merge).await;
                let _ = response.send(result);
            }

            PartitionCommand::Stats { response } => {
                let _ = response.send(self.stats());
            }

            PartitionCommand::Shutdown => {
                return false;
            }
        }
        true
    }

    fn handle_wait(&mut self, known: VersionToken, response: oneshot::Sender<SharedEntry<T>>) {
        let current = self.current.load_full();
        if current.version != known {
            // A commit landed between the caller's check and this command
            let _ = response.send(current);
            return;
        }

        // Pollers that timed out leave closed senders behind
        self.waiters.retain(|w| !w.is_closed());
        self.waiters.push(response);
    }

    async fn handle_merge(&mut self, incoming: T, merge: MergeFn<T>) -> CacheResult<SharedEntry<T>> {
        let current = self.current.load_full();
        let next = match current.value() {
            Some(existing) => {
                let mut next = existing.clone();
                if !merge(&mut next, incoming) {
                    self.unchanged_merges += 1;
                    return Ok(current);
                }
                next
            }
            None => incoming,
        };
        self.commit(next).await
    }

    /// Trim to retention, persist (if write-through), publish the successor
    /// entry, then wake every parked poller
    async fn commit(&mut self, mut value: T) -> CacheResult<SharedEntry<T>> {
        let evicted = self.trim.map_or(0, |trim| trim(&mut value, &self.retention));
        if evicted > 0 {
            self.evicted += evicted as u64;
            debug!("Partition {} evicted {} entries", self.key, evicted);
        }

        if self.persistence == Persistence::WriteThrough
            && let Err(source) = self.store.persist(&self.key, &value).await
        {
            self.persist_failures += 1;
            warn!(
                "Partition {} persist to {} failed, write dropped: {}",
                self.key,
                self.store.name(),
                source
            );
            return Err(CacheError::Persist {
                key: self.key.to_string(),
                source,
            });
        }

        let next = Arc::new(self.current.load().next(value));
        self.current.store(Arc::clone(&next));
        self.writes_committed += 1;

        let waiters = std::mem::take(&mut self.waiters);
        let woken = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Arc::clone(&next));
        }

        log::trace!(
            "Partition {} committed serial {} version {} ({} pollers woken)",
            self.key,
            next.serial,
            next.version,
            woken
        );
        Ok(next)
    }

    fn stats(&self) -> PartitionStats {
        let current = self.current.load();
        PartitionStats {
            key: self.key.to_string(),
            serial: current.serial,
            populated: current.is_populated(),
            parked_waiters: self.waiters.iter().filter(|w| !w.is_closed()).count(),
            writes_committed: self.writes_committed,
            unchanged_merges: self.unchanged_merges,
            persist_failures: self.persist_failures,
            evicted: self.evicted,
            commands_in_queue: self.receiver.len(),
        }
    }
}
