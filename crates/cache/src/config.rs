use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::conflation::ConflationOptions;
use crate::partition::{PartitionOptions, Persistence};
use crate::replica::ReplicaOptions;

/// What a producer does when a conflation queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room
    #[default]
    DropOldest,
    /// Discard the incoming item
    DropNewest,
    /// Wait up to `enqueue_timeout_ms` for space, then discard the incoming item
    BlockWithTimeout,
}

/// How much history keyed collections keep
///
/// Applied on every commit and on activation. Open orders are
/// never evicted; only terminal ones count against `max_terminal_orders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// Most recent bars per (symbol, interval)
    #[serde(default = "default_max_klines")]
    pub max_klines: usize,
    /// Most recent fills per symbol, by trade id
    #[serde(default = "default_max_trades")]
    pub max_trades: usize,
    /// Filled, canceled, rejected or expired orders kept per symbol
    #[serde(default = "default_max_terminal_orders")]
    pub max_terminal_orders: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Retention {
            max_klines: default_max_klines(),
            max_trades: default_max_trades(),
            max_terminal_orders: default_max_terminal_orders(),
        }
    }
}

/// Tunables for partitions, replicas and conflation buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Pause between replica polls after a change was applied
    #[serde(default = "default_poll_period")]
    pub poll_period_ms: u64,
    /// Upper bound on one long-poll
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    /// Minimum spacing between two conflation flushes
    #[serde(default = "default_drain_period")]
    pub drain_period_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default = "default_enqueue_timeout")]
    pub enqueue_timeout_ms: u64,
    /// Mailbox depth of each partition actor
    #[serde(default = "default_command_buffer_size")]
    pub command_buffer_size: usize,
    #[serde(default)]
    pub retention: Retention,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            poll_period_ms: default_poll_period(),
            poll_timeout_ms: default_poll_timeout(),
            drain_period_ms: default_drain_period(),
            queue_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
            enqueue_timeout_ms: default_enqueue_timeout(),
            command_buffer_size: default_command_buffer_size(),
            retention: Retention::default(),
        }
    }
}

impl CacheConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn drain_period(&self) -> Duration {
        Duration::from_millis(self.drain_period_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn replica(&self) -> ReplicaOptions {
        ReplicaOptions {
            poll_period: self.poll_period(),
            poll_timeout: self.poll_timeout(),
        }
    }

    pub fn conflation(&self, label: impl Into<String>) -> ConflationOptions {
        ConflationOptions {
            label: label.into(),
            capacity: self.queue_capacity,
            drain_period: self.drain_period(),
            overflow_policy: self.overflow_policy,
            enqueue_timeout: self.enqueue_timeout(),
        }
    }

    pub fn partition(&self, persistence: Persistence) -> PartitionOptions {
        PartitionOptions {
            persistence,
            command_buffer_size: self.command_buffer_size,
            retention: self.retention,
        }
    }
}

fn default_poll_period() -> u64 {
    1000
}

fn default_poll_timeout() -> u64 {
    10_000
}

fn default_drain_period() -> u64 {
    100
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_enqueue_timeout() -> u64 {
    50
}

fn default_command_buffer_size() -> usize {
    1024
}

fn default_max_klines() -> usize {
    1000
}

fn default_max_trades() -> usize {
    1000
}

fn default_max_terminal_orders() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_period(), Duration::from_secs(1));
        assert_eq!(config.poll_timeout(), Duration::from_secs(10));
        assert_eq!(config.drain_period(), Duration::from_millis(100));
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.retention, Retention::default());
    }

    #[test]
    fn test_retention_reaches_partition_options() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"retention": {"max_klines": 10}}"#).unwrap();
        assert_eq!(config.retention.max_klines, 10);
        assert_eq!(config.retention.max_trades, 1000);

        let options = config.partition(Persistence::WriteThrough);
        assert_eq!(options.retention.max_klines, 10);
    }

    #[test]
    fn test_overflow_policy_names() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"overflow_policy": "block_with_timeout", "queue_capacity": 8}"#)
                .unwrap();
        assert_eq!(config.overflow_policy, OverflowPolicy::BlockWithTimeout);

        let options = config.conflation("ticker:ABCUSD");
        assert_eq!(options.capacity, 8);
        assert_eq!(options.label, "ticker:ABCUSD");
    }
}
