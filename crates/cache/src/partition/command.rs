use tokio::sync::oneshot;

use crate::config::Retention;
use crate::error::CacheResult;
use crate::version::{SharedEntry, VersionToken};

/// In-place merge of an incoming value; returns false when nothing changed
pub type MergeFn<T> = fn(&mut T, T) -> bool;

/// Bounds a value to its retention; returns the number of entries evicted
pub type TrimFn<T> = fn(&mut T, &Retention) -> usize;

/// Commands handled by a partition actor
pub enum PartitionCommand<T> {
    /// Long-poll: answer now if `known` is stale, otherwise park until the next commit
    WaitForChange {
        known: VersionToken,
        response: oneshot::Sender<SharedEntry<T>>,
    },

    /// Replace the value wholesale
    Set {
        value: T,
        response: oneshot::Sender<CacheResult<SharedEntry<T>>>,
    },

    /// Fold a value into the current one
    Merge {
        value: T,
        merge: MergeFn<T>,
        response: oneshot::Sender<CacheResult<SharedEntry<T>>>,
    },

    /// Get partition statistics
    Stats {
        response: oneshot::Sender<PartitionStats>,
    },

    /// Shutdown the partition; parked pollers are released empty-handed
    Shutdown,
}

/// Statistics for a partition
#[derive(Debug, Clone, Default)]
pub struct PartitionStats {
    pub key: String,
    pub serial: u64,
    pub populated: bool,
    pub parked_waiters: usize,
    pub writes_committed: u64,
    pub unchanged_merges: u64,
    pub persist_failures: u64,
    /// Collection entries dropped by retention
    pub evicted: u64,
    pub commands_in_queue: usize,
}
