//! Bootstrap - explicit wiring of the cache, buffers and routes
//!
//! Builds, for every configured symbol, asset and kline interval:
//! - the authoritative partition (activated through its directory, with
//!   retry on a failed initial load)
//! - the conflation buffer feeding it
//! - the route that sends ingestion events to that buffer

use log::{info, warn};
use std::sync::Arc;
use strata_cache::{
    CacheConfig, CacheValue, ConflationBuffer, KlineSet, LatestByEventTime, MemoryStore,
    MergeSink, OrderSet, PartitionCache, PartitionDirectory, PartitionKey, Persistence,
    ReplicaOptions, TradeSet, UpsertInto,
};
use strata_core::{Asset, Balance, KlineKey, MiniTicker, Symbol};
use strata_gateway::RouteTable;
use strata_ports::BackingStore;
use tokio_util::sync::CancellationToken;

use crate::config::{RetryConfig, StrataConfig};
use crate::error::RunnerError;

/// Backing store per partition family
#[derive(Clone)]
pub struct Stores {
    pub tickers: Arc<dyn BackingStore<Symbol, MiniTicker>>,
    pub klines: Arc<dyn BackingStore<KlineKey, KlineSet>>,
    pub orders: Arc<dyn BackingStore<Symbol, OrderSet>>,
    pub trades: Arc<dyn BackingStore<Symbol, TradeSet>>,
    pub balances: Arc<dyn BackingStore<Asset, Balance>>,
}

impl Stores {
    /// Process-local stores; nothing survives a restart
    pub fn in_memory() -> Self {
        Self {
            tickers: Arc::new(MemoryStore::<Symbol, MiniTicker>::new()),
            klines: Arc::new(MemoryStore::<KlineKey, KlineSet>::new()),
            orders: Arc::new(MemoryStore::<Symbol, OrderSet>::new()),
            trades: Arc::new(MemoryStore::<Symbol, TradeSet>::new()),
            balances: Arc::new(MemoryStore::<Asset, Balance>::new()),
        }
    }
}

/// One partition directory per partition family
#[derive(Clone)]
pub struct Directories {
    pub tickers: PartitionDirectory<Symbol, MiniTicker>,
    pub klines: PartitionDirectory<KlineKey, KlineSet>,
    pub orders: PartitionDirectory<Symbol, OrderSet>,
    pub trades: PartitionDirectory<Symbol, TradeSet>,
    pub balances: PartitionDirectory<Asset, Balance>,
}

impl Directories {
    /// Tickers are too hot to write through; every other family persists
    pub fn new(stores: Stores, cache: &CacheConfig) -> Self {
        let durable = cache.partition(Persistence::WriteThrough);
        Self {
            tickers: PartitionDirectory::new(
                "tickers",
                stores.tickers,
                cache.partition(Persistence::LoadOnly),
            ),
            klines: PartitionDirectory::bounded("klines", stores.klines, durable.clone()),
            orders: PartitionDirectory::bounded("orders", stores.orders, durable.clone()),
            trades: PartitionDirectory::bounded("trades", stores.trades, durable.clone()),
            balances: PartitionDirectory::new("balances", stores.balances, durable),
        }
    }

    /// Active partitions across every family
    pub fn partition_count(&self) -> usize {
        self.tickers.len()
            + self.klines.len()
            + self.orders.len()
            + self.trades.len()
            + self.balances.len()
    }

    pub async fn shutdown_all(&self) {
        self.tickers.shutdown_all().await;
        self.klines.shutdown_all().await;
        self.orders.shutdown_all().await;
        self.trades.shutdown_all().await;
        self.balances.shutdown_all().await;
    }
}

/// Wired partitions and routes, ready for a pump and a market view
pub struct Bootstrap {
    pub directories: Directories,
    pub routes: RouteTable,
    pub replica_options: ReplicaOptions,
}

impl Bootstrap {
    /// Activate every configured partition and start its conflation buffer
    ///
    /// Drain loops run until `cancel` fires.
    pub async fn build(
        config: &StrataConfig,
        stores: Stores,
        cancel: &CancellationToken,
    ) -> Result<Self, RunnerError> {
        let directories = Directories::new(stores, &config.cache);
        let mut routes = RouteTable::new();
        let retry = &config.activation;

        for symbol in &config.symbols {
            let ticker = activate(&directories.tickers, symbol, retry).await?;
            routes.add_ticker(
                symbol.clone(),
                ConflationBuffer::spawn(
                    config.cache.conflation(format!("ticker:{}", symbol)),
                    LatestByEventTime::new(),
                    MergeSink(ticker),
                    cancel,
                ),
            );

            for &interval in &config.kline_intervals {
                let key = KlineKey::new(symbol.clone(), interval);
                let klines = activate(&directories.klines, &key, retry).await?;
                routes.add_kline(
                    key.clone(),
                    ConflationBuffer::spawn(
                        config.cache.conflation(format!("kline:{}", key)),
                        UpsertInto::<KlineSet>::new(),
                        MergeSink(klines),
                        cancel,
                    ),
                );
            }

            let orders = activate(&directories.orders, symbol, retry).await?;
            routes.add_orders(
                symbol.clone(),
                ConflationBuffer::spawn(
                    config.cache.conflation(format!("orders:{}", symbol)),
                    UpsertInto::<OrderSet>::new(),
                    MergeSink(orders),
                    cancel,
                ),
            );

            let trades = activate(&directories.trades, symbol, retry).await?;
            routes.add_trades(
                symbol.clone(),
                ConflationBuffer::spawn(
                    config.cache.conflation(format!("trades:{}", symbol)),
                    UpsertInto::<TradeSet>::new(),
                    MergeSink(trades),
                    cancel,
                ),
            );
        }

        for asset in &config.assets {
            let balance = activate(&directories.balances, asset, retry).await?;
            routes.add_balance(
                asset.clone(),
                ConflationBuffer::spawn(
                    config.cache.conflation(format!("balance:{}", asset)),
                    LatestByEventTime::new(),
                    MergeSink(balance),
                    cancel,
                ),
            );
        }

        info!(
            "Bootstrap complete: {} partitions, {} routes",
            directories.partition_count(),
            routes.len()
        );

        Ok(Self {
            directories,
            routes,
            replica_options: config.cache.replica(),
        })
    }
}

/// Activate `key`, retrying a failed initial load with a fixed delay
pub async fn activate<K: PartitionKey, T: CacheValue>(
    directory: &PartitionDirectory<K, T>,
    key: &K,
    retry: &RetryConfig,
) -> Result<PartitionCache<K, T>, RunnerError> {
    let mut attempt = 1;
    loop {
        match directory.get_or_activate(key).await {
            Ok(cache) => return Ok(cache),
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                warn!(
                    "Activating {} {} failed (attempt {}/{}): {}",
                    directory.name(),
                    key,
                    attempt,
                    retry.max_attempts,
                    e
                );
                attempt += 1;
                tokio::time::sleep(retry.delay()).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
