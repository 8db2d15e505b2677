//! Market view - what strategy executors read and write through
//!
//! Reads are served from replicas, created lazily the first time a key is
//! asked for. A replica follows one activation of its partition; when the
//! directory holds a newer activation the replica is rebuilt against it. A
//! key with no active partition has no replica and reads as absent.

use dashmap::DashMap;
use log::debug;
use std::time::Duration;
use strata_cache::{
    KlineSet, Mergeable, OrderSet, PartitionDirectory, PartitionKey, ReadReplica, ReplicaOptions,
    SharedEntry, TradeSet, VersionToken,
};
use strata_core::{Asset, Balance, Kline, KlineKey, MiniTicker, Order, Price, Symbol};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::Directories;
use crate::error::RunnerError;

/// Replica-backed read side of the cache
pub struct MarketView {
    directories: Directories,
    options: ReplicaOptions,
    cancel: CancellationToken,
    tickers: DashMap<Symbol, ReadReplica<Symbol, MiniTicker>>,
    klines: DashMap<KlineKey, ReadReplica<KlineKey, KlineSet>>,
    orders: DashMap<Symbol, ReadReplica<Symbol, OrderSet>>,
    trades: DashMap<Symbol, ReadReplica<Symbol, TradeSet>>,
    balances: DashMap<Asset, ReadReplica<Asset, Balance>>,
}

impl MarketView {
    /// Replica poll loops started by this view stop when `cancel` fires
    pub fn new(
        directories: Directories,
        options: ReplicaOptions,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            directories,
            options,
            cancel: cancel.child_token(),
            tickers: DashMap::new(),
            klines: DashMap::new(),
            orders: DashMap::new(),
            trades: DashMap::new(),
            balances: DashMap::new(),
        }
    }

    pub fn ticker(&self, symbol: &Symbol) -> Option<MiniTicker> {
        self.ticker_replica(symbol)?.get()
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.ticker_replica(symbol)?.read(|t| t.map(|t| t.close))
    }

    pub fn klines(&self, key: &KlineKey) -> Option<KlineSet> {
        self.kline_replica(key)?.get()
    }

    /// Most recent bar whose window has ended
    pub fn last_closed_kline(&self, key: &KlineKey) -> Option<Kline> {
        self.kline_replica(key)?
            .read(|set| set.and_then(|s| s.last_closed().cloned()))
    }

    /// Orders still working on the book, oldest change first
    pub fn open_orders(&self, symbol: &Symbol) -> Vec<Order> {
        self.order_replica(symbol)
            .map(|r| {
                r.read(|set| {
                    set.map(|s| s.open_orders().cloned().collect())
                        .unwrap_or_default()
                })
            })
            .unwrap_or_default()
    }

    pub fn order(&self, symbol: &Symbol, order_id: i64) -> Option<Order> {
        self.order_replica(symbol)?
            .read(|set| set.and_then(|s| s.get(order_id).cloned()))
    }

    pub fn trades(&self, symbol: &Symbol) -> Option<TradeSet> {
        self.trade_replica(symbol)?.get()
    }

    pub fn balance(&self, asset: &Asset) -> Option<Balance> {
        self.balance_replica(asset)?.get()
    }

    /// Long-poll the authoritative ticker partition, bypassing the replica
    ///
    /// `None` when nothing changed within `timeout` or the symbol has no
    /// partition.
    pub async fn wait_for_ticker(
        &self,
        symbol: &Symbol,
        known: VersionToken,
        timeout: Duration,
    ) -> Option<SharedEntry<MiniTicker>> {
        let cache = self.directories.tickers.get(symbol)?;
        cache.wait_for_change(known, timeout).await
    }

    /// Record a locally known order change, e.g. an order the executor just
    /// placed, before the exchange stream reports it
    pub async fn record_order(&self, order: Order) -> Result<(), RunnerError> {
        let replica = self
            .order_replica(&order.symbol)
            .ok_or_else(|| RunnerError::UnknownPartition(format!("orders:{}", order.symbol)))?;
        replica.merge(OrderSet::from_iter([order])).await?;
        Ok(())
    }

    /// Replicas created so far
    pub fn replica_count(&self) -> usize {
        self.tickers.len()
            + self.klines.len()
            + self.orders.len()
            + self.trades.len()
            + self.balances.len()
    }

    /// Stop every replica poll loop
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn ticker_replica(&self, symbol: &Symbol) -> Option<ReadReplica<Symbol, MiniTicker>> {
        self.replica(&self.tickers, &self.directories.tickers, symbol)
    }

    fn kline_replica(&self, key: &KlineKey) -> Option<ReadReplica<KlineKey, KlineSet>> {
        self.replica(&self.klines, &self.directories.klines, key)
    }

    fn order_replica(&self, symbol: &Symbol) -> Option<ReadReplica<Symbol, OrderSet>> {
        self.replica(&self.orders, &self.directories.orders, symbol)
    }

    fn trade_replica(&self, symbol: &Symbol) -> Option<ReadReplica<Symbol, TradeSet>> {
        self.replica(&self.trades, &self.directories.trades, symbol)
    }

    fn balance_replica(&self, asset: &Asset) -> Option<ReadReplica<Asset, Balance>> {
        self.replica(&self.balances, &self.directories.balances, asset)
    }

    fn replica<K: PartitionKey, T: Mergeable>(
        &self,
        replicas: &DashMap<K, ReadReplica<K, T>>,
        directory: &PartitionDirectory<K, T>,
        key: &K,
    ) -> Option<ReadReplica<K, T>> {
        let Some(cache) = directory.get(key) else {
            // Partition shut down and forgotten; drop whatever mirrored it
            replicas.remove(key);
            return None;
        };
        let epoch = cache.get().epoch;

        if let Some(replica) = replicas.get(key)
            && replica.cache().get().epoch == epoch
        {
            return Some(replica.clone());
        }

        let mut slot = replicas
            .entry(key.clone())
            .or_insert_with(|| ReadReplica::spawn(cache.clone(), self.options.clone(), &self.cancel));
        if slot.cache().get().epoch != epoch {
            debug!("Replica of {} rebuilt for re-activated partition", key);
            *slot = ReadReplica::spawn(cache, self.options.clone(), &self.cancel);
        }
        Some(slot.clone())
    }
}
