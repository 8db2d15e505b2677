//! Conflation front door for partition writes
//!
//! Producers hand items to a bounded queue and never wait longer than the
//! configured enqueue timeout. One drain loop per buffer empties whatever is
//! queued, folds it through a `Conflator`, and makes at most one sink write
//! per drain period:
//!
//! ```text
//!   push()/enqueue() ──► ArrayQueue ──► drain loop ──► Conflator ──► ConflationSink
//!       (bounded, overflow policy)     (paced by drain_period)        (PartitionCache)
//! ```

mod conflator;
mod queue;
mod sink;

pub use conflator::{Conflator, FnConflator, LatestByEventTime, UpsertInto};
pub use queue::EnqueueOutcome;
pub use sink::{ConflationSink, MergeSink, SetSink};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::OverflowPolicy;
use queue::BoundedQueue;

/// Configuration for one conflation buffer
#[derive(Debug, Clone)]
pub struct ConflationOptions {
    /// Name used in logs and stats, e.g. `ticker:BTCUSDT`
    pub label: String,
    pub capacity: usize,
    /// Minimum spacing between two sink writes
    pub drain_period: Duration,
    pub overflow_policy: OverflowPolicy,
    /// How long `enqueue` waits for space under `BlockWithTimeout`
    pub enqueue_timeout: Duration,
}

impl Default for ConflationOptions {
    fn default() -> Self {
        Self {
            label: "conflation".to_string(),
            capacity: 1024,
            drain_period: Duration::from_millis(100),
            overflow_policy: OverflowPolicy::DropOldest,
            enqueue_timeout: Duration::from_millis(50),
        }
    }
}

impl ConflationOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }
}

/// Statistics for a conflation buffer
#[derive(Debug, Clone, Default)]
pub struct ConflationStats {
    pub label: String,
    pub accepted: u64,
    pub displaced: u64,
    pub dropped: u64,
    pub flushes: u64,
    /// Items folded across all flushes
    pub conflated: u64,
    pub sink_failures: u64,
    pub queued: usize,
}

/// Producer handle of a conflation buffer
pub struct ConflationBuffer<TIn> {
    queue: Arc<BoundedQueue<TIn>>,
    enqueue_timeout: Duration,
}

impl<TIn> Clone for ConflationBuffer<TIn> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            enqueue_timeout: self.enqueue_timeout,
        }
    }
}

impl<TIn: Send + 'static> ConflationBuffer<TIn> {
    /// Start the drain loop and return the producer handle
    pub fn spawn<C, S>(
        options: ConflationOptions,
        conflator: C,
        sink: S,
        cancel: &CancellationToken,
    ) -> Self
    where
        C: Conflator<TIn>,
        S: ConflationSink<C::Out>,
    {
        let queue = Arc::new(BoundedQueue::new(
            options.label,
            options.capacity,
            options.overflow_policy,
        ));

        tokio::spawn(drain_loop(
            Arc::clone(&queue),
            conflator,
            sink,
            options.drain_period,
            cancel.clone(),
        ));

        Self {
            queue,
            enqueue_timeout: options.enqueue_timeout,
        }
    }

    pub fn label(&self) -> &str {
        &self.queue.label
    }

    /// Hand over an item without ever waiting
    pub fn push(&self, item: TIn) -> EnqueueOutcome {
        match self.queue.offer(item) {
            Ok(outcome) => outcome,
            Err(_rejected) => self.queue.record_drop(),
        }
    }

    /// Hand over an item, waiting up to the enqueue timeout for space
    /// when the policy is `BlockWithTimeout`
    pub async fn enqueue(&self, item: TIn) -> EnqueueOutcome {
        if self.queue.policy != OverflowPolicy::BlockWithTimeout {
            return self.push(item);
        }

        let deadline = Instant::now() + self.enqueue_timeout;
        let mut item = item;
        loop {
            // Register interest before trying, so a drain between the failed
            // push and the await is not missed
            let space = self.queue.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.queue.offer(item) {
                Ok(outcome) => return outcome,
                Err(rejected) => item = rejected,
            }

            if tokio::time::timeout_at(deadline, space).await.is_err() {
                return self.queue.record_drop();
            }
        }
    }

    pub fn stats(&self) -> ConflationStats {
        let q = &self.queue;
        ConflationStats {
            label: q.label.clone(),
            accepted: q.accepted.load(Ordering::Relaxed),
            displaced: q.displaced.load(Ordering::Relaxed),
            dropped: q.dropped.load(Ordering::Relaxed),
            flushes: q.flushes.load(Ordering::Relaxed),
            conflated: q.conflated.load(Ordering::Relaxed),
            sink_failures: q.sink_failures.load(Ordering::Relaxed),
            queued: q.items.len(),
        }
    }

    /// True once the drain loop has stopped
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

async fn drain_loop<TIn, C, S>(
    queue: Arc<BoundedQueue<TIn>>,
    conflator: C,
    sink: S,
    drain_period: Duration,
    cancel: CancellationToken,
) where
    TIn: Send + 'static,
    C: Conflator<TIn>,
    S: ConflationSink<C::Out>,
{
    log::debug!("Conflation buffer {} draining", queue.label);
    let mut last_flush: Option<Instant> = None;

    loop {
        if queue.items.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = queue.item_ready.notified() => {}
            }
        }

        if let Some(last) = last_flush {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(last + drain_period) => {}
            }
        }

        let mut agg = conflator.init();
        let mut drained = 0u64;
        while let Some(item) = queue.items.pop() {
            agg = conflator.merge(agg, item);
            drained += 1;
        }
        queue.space_ready.notify_waiters();

        // Stale permit from a push already drained last cycle
        if drained == 0 {
            continue;
        }

        last_flush = Some(Instant::now());
        queue.flushes.fetch_add(1, Ordering::Relaxed);
        queue.conflated.fetch_add(drained, Ordering::Relaxed);

        let Some(out) = conflator.finalize(agg) else {
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = sink.deliver(out) => {
                if let Err(e) = result {
                    queue.sink_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Conflation buffer {} flush of {} items failed: {}",
                        queue.label,
                        drained,
                        e
                    );
                }
            }
        }
    }

    queue.closed.store(true, Ordering::Release);
    queue.space_ready.notify_waiters();
    log::debug!(
        "Conflation buffer {} stopped ({} items discarded)",
        queue.label,
        queue.items.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, CacheResult};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use strata_core::{MiniTicker, Timestamp};

    #[derive(Clone)]
    struct RecordingSink<T> {
        delivered: Arc<Mutex<Vec<T>>>,
        fail: Arc<std::sync::atomic::AtomicBool>,
    }

    // Manual impl: no `T: Default` bound, the recorded values never need one
    impl<T> Default for RecordingSink<T> {
        fn default() -> Self {
            Self {
                delivered: Arc::new(Mutex::new(Vec::new())),
                fail: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }
    }

    impl<T: Clone> RecordingSink<T> {
        fn delivered(&self) -> Vec<T> {
            self.delivered.lock().clone()
        }
    }

    #[async_trait]
    impl<T: Send + Sync + 'static> ConflationSink<T> for RecordingSink<T> {
        async fn deliver(&self, item: T) -> CacheResult<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(CacheError::PartitionClosed("sink".to_string()));
            }
            self.delivered.lock().push(item);
            Ok(())
        }
    }

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn tick(close: i64, secs: i64) -> MiniTicker {
        MiniTicker::last_price("XYZ", Decimal::from(close), t(secs))
    }

    fn sum_conflator() -> impl Conflator<u64, Out = u64> {
        FnConflator::new(
            || 0u64,
            |sum: u64, n: u64| sum + n,
            |sum: u64| (sum > 0).then_some(sum),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_single_write_of_max() {
        let sink = RecordingSink::default();
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default(),
            LatestByEventTime::new(),
            sink.clone(),
            &CancellationToken::new(),
        );

        // Event times shuffled relative to arrival order
        for i in 0..100i64 {
            let secs = (i * 37) % 100;
            assert_eq!(buffer.push(tick(secs, secs)), EnqueueOutcome::Accepted);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].event_time, t(99));

        let stats = buffer.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.conflated, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_are_paced_by_drain_period() {
        let sink = RecordingSink::default();
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default(),
            sum_conflator(),
            sink.clone(),
            &CancellationToken::new(),
        );

        buffer.push(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(sink.delivered(), vec![1]);

        // Arrives inside the drain period: held back, then folded together
        buffer.push(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.push(3);
        assert_eq!(sink.delivered(), vec![1]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.delivered(), vec![1, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_oldest_displaces() {
        let sink = RecordingSink::default();
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default().with_capacity(2),
            sum_conflator(),
            sink.clone(),
            &CancellationToken::new(),
        );

        assert_eq!(buffer.push(1), EnqueueOutcome::Accepted);
        assert_eq!(buffer.push(2), EnqueueOutcome::Accepted);
        assert_eq!(buffer.push(4), EnqueueOutcome::Displaced);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(sink.delivered(), vec![6]);
        assert_eq!(buffer.stats().displaced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_newest_rejects() {
        let sink = RecordingSink::default();
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default()
                .with_capacity(2)
                .with_overflow_policy(OverflowPolicy::DropNewest),
            sum_conflator(),
            sink.clone(),
            &CancellationToken::new(),
        );

        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.push(4), EnqueueOutcome::Dropped);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(sink.delivered(), vec![3]);
        assert_eq!(buffer.stats().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_with_timeout_waits_for_drain() {
        let sink = RecordingSink::default();
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default()
                .with_capacity(1)
                .with_overflow_policy(OverflowPolicy::BlockWithTimeout),
            sum_conflator(),
            sink.clone(),
            &CancellationToken::new(),
        );

        assert_eq!(buffer.enqueue(1).await, EnqueueOutcome::Accepted);
        // Full until the drain loop runs; it does so while we wait
        assert_eq!(buffer.enqueue(2).await, EnqueueOutcome::Accepted);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(sink.delivered().iter().sum::<u64>(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_with_timeout_gives_up() {
        struct StuckSink;

        #[async_trait]
        impl ConflationSink<u64> for StuckSink {
            async fn deliver(&self, _item: u64) -> CacheResult<()> {
                std::future::pending().await
            }
        }

        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default()
                .with_capacity(1)
                .with_overflow_policy(OverflowPolicy::BlockWithTimeout),
            sum_conflator(),
            StuckSink,
            &CancellationToken::new(),
        );

        // First item is taken by the drain loop, which then hangs in the sink
        buffer.push(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(buffer.push(2), EnqueueOutcome::Accepted);

        let started = Instant::now();
        assert_eq!(buffer.enqueue(3).await, EnqueueOutcome::Dropped);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(buffer.stats().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_is_counted_and_loop_continues() {
        let sink: RecordingSink<u64> = RecordingSink::default();
        sink.fail.store(true, Ordering::Relaxed);
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default(),
            sum_conflator(),
            sink.clone(),
            &CancellationToken::new(),
        );

        buffer.push(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(buffer.stats().sink_failures, 1);

        sink.fail.store(false, Ordering::Relaxed);
        buffer.push(2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.delivered(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_buffer() {
        let cancel = CancellationToken::new();
        let buffer = ConflationBuffer::spawn(
            ConflationOptions::default(),
            sum_conflator(),
            RecordingSink::default(),
            &cancel,
        );

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(buffer.is_closed());
        assert_eq!(buffer.push(1), EnqueueOutcome::Closed);
    }
}
