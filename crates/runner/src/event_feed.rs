//! Event Feed - simulated exchange stream
//!
//! Generates the decoded events an exchange connection would deliver:
//! - Mini tickers from a per-symbol random walk
//! - Kline updates for every configured interval, closing bars as the
//!   simulated clock crosses their window
//! - Account activity: new orders, fills with their trades, balance changes
//! - The occasional exchange error frame
//!
//! Events go out on an in-process broadcast channel. `FeedConnector` hands
//! out `ChannelSource`s on it and can drop every open connection at once.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::{
    AccountTrade, Asset, Balance, ErrorFrame, Kline, KlineInterval, KlineKey, MarketEvent,
    MiniTicker, Order, OrderStatus, OrderType, Side, Symbol, Timestamp,
};
use strata_gateway::{ChannelPublisher, ChannelSource, Publisher};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::FeedConfig;

/// Hands out connections to the feed
///
/// Clones share the same channel. `drop_connections` swaps in a fresh
/// channel so every source connected so far sees a disconnect.
#[derive(Clone)]
pub struct FeedConnector {
    publisher: Arc<Mutex<ChannelPublisher<MarketEvent>>>,
    capacity: usize,
    connections: Arc<AtomicU64>,
}

impl FeedConnector {
    fn new(capacity: usize) -> Self {
        let (publisher, _) = ChannelPublisher::pair(capacity);
        Self {
            publisher: Arc::new(Mutex::new(publisher)),
            capacity,
            connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a new connection to the feed
    pub fn connect(&self) -> ChannelSource {
        let n = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        let subscriber = self.publisher.lock().subscribe();
        ChannelSource::new(format!("feed#{}", n), subscriber)
    }

    /// Close every open connection
    pub fn drop_connections(&self) {
        let (fresh, _) = ChannelPublisher::pair(self.capacity);
        let old = std::mem::replace(&mut *self.publisher.lock(), fresh);
        info!("Feed dropping {} connection(s)", old.receiver_count());
    }

    /// Connections opened so far
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Currently connected sources
    pub fn connected(&self) -> usize {
        self.publisher.lock().receiver_count()
    }

    fn publisher(&self) -> ChannelPublisher<MarketEvent> {
        self.publisher.lock().clone()
    }
}

/// Generates simulated exchange events
pub struct FeedSimulator {
    config: FeedConfig,
    symbols: Vec<Symbol>,
    assets: Vec<Asset>,
    intervals: Vec<KlineInterval>,
    /// Current last price per symbol
    prices: BTreeMap<Symbol, Decimal>,
    /// Open bar per kline partition
    bars: HashMap<KlineKey, Kline>,
    balances: BTreeMap<Asset, Balance>,
    open_orders: Vec<Order>,
    next_order_id: i64,
    next_trade_id: i64,
    /// Simulated exchange time, advanced one tick interval per tick
    clock: Timestamp,
    connector: FeedConnector,
    rng: StdRng,
}

impl FeedSimulator {
    /// Create a new feed; seeded from `config.seed` when set
    pub fn new(
        config: FeedConfig,
        symbols: Vec<Symbol>,
        assets: Vec<Asset>,
        intervals: Vec<KlineInterval>,
    ) -> Self {
        let rng: StdRng = match config.seed {
            Some(seed) => rand::SeedableRng::seed_from_u64(seed),
            None => rand::SeedableRng::from_entropy(),
        };
        Self::with_rng(config, symbols, assets, intervals, rng)
    }

    /// Create with a specific seed for reproducible runs
    pub fn with_seed(
        config: FeedConfig,
        symbols: Vec<Symbol>,
        assets: Vec<Asset>,
        intervals: Vec<KlineInterval>,
        seed: u64,
    ) -> Self {
        let rng = rand::SeedableRng::seed_from_u64(seed);
        Self::with_rng(config, symbols, assets, intervals, rng)
    }

    fn with_rng(
        config: FeedConfig,
        symbols: Vec<Symbol>,
        assets: Vec<Asset>,
        intervals: Vec<KlineInterval>,
        rng: StdRng,
    ) -> Self {
        let clock = Utc::now();
        let prices = symbols
            .iter()
            .map(|s| (s.clone(), config.initial_price(s)))
            .collect();
        let balances = assets
            .iter()
            .map(|a| (a.clone(), Balance::new(a.clone(), dec!(1000), dec!(0), clock)))
            .collect();

        Self {
            connector: FeedConnector::new(config.channel_capacity),
            config,
            symbols,
            assets,
            intervals,
            prices,
            bars: HashMap::new(),
            balances,
            open_orders: Vec::new(),
            next_order_id: 1,
            next_trade_id: 1,
            clock,
            rng,
        }
    }

    pub fn connector(&self) -> FeedConnector {
        self.connector.clone()
    }

    /// Get current last price for a symbol
    pub fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    /// Last balance the feed reported for an asset
    pub fn balance(&self, asset: &Asset) -> Option<&Balance> {
        self.balances.get(asset)
    }

    /// Simulated exchange time
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// Orders the feed still considers working
    pub fn open_orders(&self) -> &[Order] {
        &self.open_orders
    }

    /// Generate the events of the next tick
    pub fn next_events(&mut self) -> Vec<MarketEvent> {
        self.clock += ChronoDuration::milliseconds(self.config.tick_interval_ms as i64);

        let mut events = Vec::new();
        if self.symbols.is_empty() {
            return events;
        }

        let symbol = self.symbols[self.rng.gen_range(0..self.symbols.len())].clone();
        let price = self.walk_price(&symbol);
        events.push(MarketEvent::Ticker(self.ticker(&symbol, price)));
        self.update_bars(&symbol, price, &mut events);

        if self.rng.gen_bool(self.config.account_event_probability) {
            self.account_activity(&symbol, price, &mut events);
        }

        if self.rng.gen_bool(self.config.error_frame_probability) {
            events.push(MarketEvent::Error(ErrorFrame {
                code: -1003,
                message: "Too many requests; current limit is 1200 request weight per minute"
                    .to_string(),
                time: self.clock,
            }));
        }

        events
    }

    /// Generate and broadcast the next tick, returning how many events went out
    pub async fn tick(&mut self) -> usize {
        let events = self.next_events();
        let publisher = self.connector.publisher();
        let mut sent = 0;
        for event in &events {
            // No connected source is fine; the event is simply not observed
            if publisher.publish(event).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Run `ticks` ticks back to back
    pub async fn run_ticks(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick().await;
        }
    }

    /// Tick on the configured interval until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Event feed started ({}ms interval, {} symbols)",
            self.config.tick_interval_ms,
            self.symbols.len()
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let disconnect_every = self.config.disconnect_every();
        let mut next_disconnect = disconnect_every.map(|d| Instant::now() + d);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }

            if let (Some(every), Some(at)) = (disconnect_every, next_disconnect)
                && Instant::now() >= at
            {
                self.connector.drop_connections();
                next_disconnect = Some(at + every);
            }
        }

        info!("Event feed stopped at {}", self.clock);
    }

    fn walk_price(&mut self, symbol: &Symbol) -> Decimal {
        let current = self
            .prices
            .get(symbol)
            .copied()
            .unwrap_or_else(|| self.config.initial_price(symbol));
        let step = Decimal::from_f64_retain(self.rng.gen_range(-1.0..1.0)).unwrap_or_default();
        let next = (current * (Decimal::ONE + self.config.price_volatility * step))
            .round_dp(8)
            .max(dec!(0.00000001));
        self.prices.insert(symbol.clone(), next);
        next
    }

    fn ticker(&mut self, symbol: &Symbol, price: Decimal) -> MiniTicker {
        let volume = Decimal::from(self.rng.gen_range(1..100u32));
        MiniTicker {
            symbol: symbol.clone(),
            event_time: self.clock,
            open: self.config.initial_price(symbol),
            high: price.max(self.config.initial_price(symbol)),
            low: price.min(self.config.initial_price(symbol)),
            close: price,
            volume,
            quote_volume: (volume * price).round_dp(8),
        }
    }

    fn update_bars(&mut self, symbol: &Symbol, price: Decimal, events: &mut Vec<MarketEvent>) {
        let volume = Decimal::from(self.rng.gen_range(1..10u32));
        for &interval in &self.intervals {
            let key = KlineKey::new(symbol.clone(), interval);
            let open_time = bar_open(self.clock, interval);

            if let Some(bar) = self.bars.get(&key)
                && bar.open_time != open_time
            {
                let mut closed = bar.clone();
                closed.is_closed = true;
                closed.event_time = self.clock;
                events.push(MarketEvent::Kline(closed));
                self.bars.remove(&key);
            }

            let bar = self.bars.entry(key).or_insert_with(|| Kline {
                symbol: symbol.clone(),
                interval,
                open_time,
                close_time: open_time + interval.duration() - ChronoDuration::milliseconds(1),
                event_time: self.clock,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: Decimal::ZERO,
                is_closed: false,
            });
            bar.high = bar.high.max(price);
            bar.low = bar.low.min(price);
            bar.close = price;
            bar.volume += volume;
            bar.event_time = self.clock;
            events.push(MarketEvent::Kline(bar.clone()));
        }
    }

    fn account_activity(&mut self, symbol: &Symbol, price: Decimal, events: &mut Vec<MarketEvent>) {
        let candidates: Vec<usize> = self
            .open_orders
            .iter()
            .enumerate()
            .filter(|(_, o)| &o.symbol == symbol)
            .map(|(i, _)| i)
            .collect();
        let fill = !candidates.is_empty() && self.rng.gen_bool(0.5);
        if fill {
            let idx = candidates[self.rng.gen_range(0..candidates.len())];
            let order = self.open_orders[idx].clone();
            let partial = order.executed_qty.is_zero() && self.rng.gen_bool(0.5);
            let qty = if partial {
                (order.remaining_qty() / dec!(2)).round_dp(8)
            } else {
                order.remaining_qty()
            };
            let executed = order.executed_qty + qty;
            let status = if executed >= order.original_qty {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            let updated = order.with_execution(executed, status, self.clock);

            if updated.is_open() {
                self.open_orders[idx] = updated.clone();
            } else {
                self.open_orders.remove(idx);
            }

            debug!(
                "Feed fill {} order {} {} @ {}",
                order.symbol, order.order_id, qty, order.price
            );
            events.push(MarketEvent::Order(updated));
            events.push(MarketEvent::Trade(AccountTrade {
                symbol: order.symbol.clone(),
                trade_id: self.next_trade_id,
                order_id: order.order_id,
                price: order.price,
                qty,
                commission: (qty * dec!(0.001)).round_dp(8),
                is_buyer: order.side.is_buy(),
                time: self.clock,
            }));
            self.next_trade_id += 1;
        } else {
            let side = if self.rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let offset = match side {
                Side::Buy => dec!(0.999),
                Side::Sell => dec!(1.001),
            };
            let qty = Decimal::from(self.rng.gen_range(1..100u32)) / dec!(100);
            let order = Order::new(
                symbol.clone(),
                self.next_order_id,
                format!("strata-{}", self.next_order_id),
                side,
                OrderType::Limit,
                (price * offset).round_dp(8),
                qty,
                self.clock,
            );
            self.next_order_id += 1;
            self.open_orders.push(order.clone());
            events.push(MarketEvent::Order(order));
        }

        if !self.assets.is_empty() {
            let asset = self.assets[self.rng.gen_range(0..self.assets.len())].clone();
            let delta = Decimal::from(self.rng.gen_range(-50..=50i32));
            let clock = self.clock;
            if let Some(balance) = self.balances.get_mut(&asset) {
                balance.free = (balance.free + delta).max(Decimal::ZERO);
                balance.updated_at = clock;
                events.push(MarketEvent::Balance(balance.clone()));
            }
        }
    }
}

/// Start of the bar window containing `at`
fn bar_open(at: Timestamp, interval: KlineInterval) -> Timestamp {
    let len = interval.duration().num_milliseconds();
    let ms = at.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(len)).unwrap_or(at)
}
