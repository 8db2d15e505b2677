use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

use crate::config::OverflowPolicy;

/// Result of handing an item to a conflation buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Accepted by evicting the oldest queued item
    Displaced,
    /// Queue full; the item was discarded
    Dropped,
    /// Drain loop has stopped; the item was discarded
    Closed,
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EnqueueOutcome::Accepted | EnqueueOutcome::Displaced)
    }
}

/// State shared between producers and the drain loop
pub(super) struct BoundedQueue<T> {
    pub(super) label: String,
    pub(super) items: ArrayQueue<T>,
    pub(super) policy: OverflowPolicy,
    /// Wakes the drain loop; `notify_one` keeps a permit if it is busy
    pub(super) item_ready: Notify,
    /// Wakes producers blocked on a full queue
    pub(super) space_ready: Notify,
    pub(super) closed: AtomicBool,
    pub(super) accepted: AtomicU64,
    pub(super) displaced: AtomicU64,
    pub(super) dropped: AtomicU64,
    pub(super) flushes: AtomicU64,
    pub(super) conflated: AtomicU64,
    pub(super) sink_failures: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub(super) fn new(label: String, capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            label,
            items: ArrayQueue::new(capacity.max(1)),
            policy,
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            closed: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
            displaced: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            conflated: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Non-blocking insert honouring the overflow policy
    ///
    /// `BlockWithTimeout` degrades to drop-newest here; only the async
    /// enqueue path waits for space.
    pub(super) fn offer(&self, item: T) -> Result<EnqueueOutcome, T> {
        if self.is_closed() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(EnqueueOutcome::Closed);
        }

        let outcome = match self.policy {
            OverflowPolicy::DropOldest => match self.items.force_push(item) {
                None => EnqueueOutcome::Accepted,
                Some(_evicted) => {
                    self.displaced.fetch_add(1, Ordering::Relaxed);
                    EnqueueOutcome::Displaced
                }
            },
            OverflowPolicy::DropNewest | OverflowPolicy::BlockWithTimeout => {
                self.items.push(item)?;
                EnqueueOutcome::Accepted
            }
        };

        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.item_ready.notify_one();
        Ok(outcome)
    }

    pub(super) fn record_drop(&self) -> EnqueueOutcome {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped.is_power_of_two() {
            log::warn!(
                "Conflation buffer {} full (capacity {}), {} items dropped so far",
                self.label,
                self.items.capacity(),
                dropped
            );
        }
        EnqueueOutcome::Dropped
    }
}
