use std::collections::HashMap;
use strata_cache::{ConflationBuffer, EnqueueOutcome};
use strata_core::{
    AccountTrade, Asset, Balance, Kline, KlineKey, MarketEvent, MiniTicker, Order, Symbol,
};

/// Where one event ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Routed(EnqueueOutcome),
    /// No buffer registered for the event's partition key
    Unroutable,
}

/// Partition key -> conflation buffer, per event type
#[derive(Clone, Default)]
pub struct RouteTable {
    tickers: HashMap<Symbol, ConflationBuffer<MiniTicker>>,
    klines: HashMap<KlineKey, ConflationBuffer<Kline>>,
    orders: HashMap<Symbol, ConflationBuffer<Order>>,
    trades: HashMap<Symbol, ConflationBuffer<AccountTrade>>,
    balances: HashMap<Asset, ConflationBuffer<Balance>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ticker(&mut self, symbol: Symbol, buffer: ConflationBuffer<MiniTicker>) {
        self.tickers.insert(symbol, buffer);
    }

    pub fn add_kline(&mut self, key: KlineKey, buffer: ConflationBuffer<Kline>) {
        self.klines.insert(key, buffer);
    }

    pub fn add_orders(&mut self, symbol: Symbol, buffer: ConflationBuffer<Order>) {
        self.orders.insert(symbol, buffer);
    }

    pub fn add_trades(&mut self, symbol: Symbol, buffer: ConflationBuffer<AccountTrade>) {
        self.trades.insert(symbol, buffer);
    }

    pub fn add_balance(&mut self, asset: Asset, buffer: ConflationBuffer<Balance>) {
        self.balances.insert(asset, buffer);
    }

    /// Total number of routes
    pub fn len(&self) -> usize {
        self.tickers.len()
            + self.klines.len()
            + self.orders.len()
            + self.trades.len()
            + self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the event to the buffer registered for its partition key
    pub async fn route(&self, event: MarketEvent) -> RouteOutcome {
        match event {
            MarketEvent::Ticker(t) => offer(self.tickers.get(&t.symbol), t).await,
            MarketEvent::Kline(k) => offer(self.klines.get(&k.key()), k).await,
            MarketEvent::Order(o) => offer(self.orders.get(&o.symbol), o).await,
            MarketEvent::Trade(t) => offer(self.trades.get(&t.symbol), t).await,
            MarketEvent::Balance(b) => offer(self.balances.get(&b.asset), b).await,
            // Error frames carry no partition
            MarketEvent::Error(_) => RouteOutcome::Unroutable,
        }
    }
}

async fn offer<T: Send + 'static>(buffer: Option<&ConflationBuffer<T>>, item: T) -> RouteOutcome {
    match buffer {
        Some(buffer) => RouteOutcome::Routed(buffer.enqueue(item).await),
        None => RouteOutcome::Unroutable,
    }
}
