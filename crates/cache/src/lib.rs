//! Strata Cache
//!
//! Reactive partitioned cache sitting between a bursty exchange feed and the
//! strategy code reading market state.
//!
//! ```text
//!  events ─► ConflationBuffer ─► PartitionCache ─► ReadReplica ─► readers
//!            (bounded, folds      (one actor per   (long-poll
//!             bursts per drain)    key, versioned)  mirror)
//! ```
//!
//! Within one partition every write is serialized through its actor and gets
//! a fresh `VersionToken` plus the next `serial`. Readers long-poll with the
//! version they last saw and are answered as soon as it is no longer current.
//! Nothing orders writes across partitions.

pub mod config;
pub mod conflation;
pub mod directory;
pub mod error;
pub mod merge;
pub mod partition;
pub mod replica;
pub mod store;
pub mod version;

pub use config::{CacheConfig, OverflowPolicy, Retention};
pub use conflation::{
    ConflationBuffer, ConflationOptions, ConflationSink, ConflationStats, Conflator,
    EnqueueOutcome, FnConflator, LatestByEventTime, MergeSink, SetSink, UpsertInto,
};
pub use directory::PartitionDirectory;
pub use error::{CacheError, CacheResult};
pub use merge::{Collect, KlineSet, Mergeable, OrderSet, TradeSet};
pub use partition::{
    CacheValue, MergeFn, PartitionCache, PartitionKey, PartitionOptions, PartitionStats,
    Persistence, TrimFn,
};
pub use replica::{ReadReplica, ReplicaOptions};
pub use store::MemoryStore;
pub use version::{CachedEntry, SharedEntry, VersionToken};
