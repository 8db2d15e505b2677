//! Per-shape merge rules
//!
//! Partitions, replicas and conflation all fold incoming state with the same
//! rules, so each value shape defines its rule exactly once here:
//!
//! - scalars (`MiniTicker`, `Balance`): last-write-wins by event time
//! - keyed sets (`KlineSet`, `TradeSet`): per-key upsert, newer-or-equal wins
//! - identity collections (`OrderSet`): remove-then-reinsert by order id
//!
//! Every rule compares the value's own event time, never arrival order, so
//! applying an update twice or out of order leaves the same result.
//!
//! Keyed collections are bounded by `Retention`: the oldest bars, the oldest
//! fills and the oldest terminal orders go first.

use std::collections::{BTreeMap, HashMap};
use strata_core::{
    AccountTrade, Balance, EventTimed, Kline, KlineKey, MiniTicker, Order, OrderId, Symbol,
    Timestamp, TradeId,
};

use crate::config::Retention;

/// A value that can absorb another value of its own shape
pub trait Mergeable: Clone + Send + Sync + 'static {
    /// Fold `incoming` into `self`. Returns false if `self` is unchanged.
    fn merge_from(&mut self, incoming: Self) -> bool;

    /// Evict whatever `retention` no longer covers, returning how many entries went
    fn retain_within(&mut self, _retention: &Retention) -> usize {
        0
    }
}

/// A keyed collection built up one item at a time
pub trait Collect<Item>: Mergeable + Default {
    /// Insert or replace one item. Returns false if the item was stale.
    fn upsert(&mut self, item: Item) -> bool;

    fn is_empty(&self) -> bool;
}

fn newer_or_equal(incoming: Timestamp, current: Timestamp) -> bool {
    incoming >= current
}

/// Pop the smallest keys until at most `keep` remain
fn evict_oldest<K: Ord, V>(map: &mut BTreeMap<K, V>, keep: usize) -> usize {
    let excess = map.len().saturating_sub(keep);
    for _ in 0..excess {
        map.pop_first();
    }
    excess
}

// ============================================================================
// Scalars
// ============================================================================

impl Mergeable for MiniTicker {
    fn merge_from(&mut self, incoming: Self) -> bool {
        if !newer_or_equal(incoming.event_time(), self.event_time()) || *self == incoming {
            return false;
        }
        *self = incoming;
        true
    }
}

impl Mergeable for Balance {
    fn merge_from(&mut self, incoming: Self) -> bool {
        if !newer_or_equal(incoming.event_time(), self.event_time()) || *self == incoming {
            return false;
        }
        *self = incoming;
        true
    }
}

// ============================================================================
// Klines: keyed by bar open time
// ============================================================================

/// Bars of one (symbol, interval) partition, ordered by open time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KlineSet {
    bars: BTreeMap<Timestamp, Kline>,
}

impl KlineSet {
    pub fn get(&self, open_time: &Timestamp) -> Option<&Kline> {
        self.bars.get(open_time)
    }

    /// Most recent bar, open or closed
    pub fn latest(&self) -> Option<&Kline> {
        self.bars.values().next_back()
    }

    /// Most recent bar whose window has ended
    pub fn last_closed(&self) -> Option<&Kline> {
        self.bars.values().rev().find(|k| k.is_closed)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Kline> {
        self.bars.values()
    }

    /// Partition key of the bars held, if any
    pub fn key(&self) -> Option<KlineKey> {
        self.latest().map(Kline::key)
    }
}

impl Collect<Kline> for KlineSet {
    fn upsert(&mut self, item: Kline) -> bool {
        match self.bars.get(&item.open_time) {
            Some(existing)
                if !newer_or_equal(item.event_time, existing.event_time) || *existing == item =>
            {
                false
            }
            _ => {
                self.bars.insert(item.open_time, item);
                true
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl Mergeable for KlineSet {
    fn merge_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        for kline in incoming.bars.into_values() {
            changed |= self.upsert(kline);
        }
        changed
    }

    fn retain_within(&mut self, retention: &Retention) -> usize {
        evict_oldest(&mut self.bars, retention.max_klines)
    }
}

impl FromIterator<Kline> for KlineSet {
    fn from_iter<I: IntoIterator<Item = Kline>>(iter: I) -> Self {
        let mut set = KlineSet::default();
        for kline in iter {
            set.upsert(kline);
        }
        set
    }
}

// ============================================================================
// Account trades: keyed by trade id
// ============================================================================

/// Fills of one symbol, keyed by trade id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeSet {
    trades: BTreeMap<TradeId, AccountTrade>,
}

impl TradeSet {
    pub fn get(&self, trade_id: TradeId) -> Option<&AccountTrade> {
        self.trades.get(&trade_id)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountTrade> {
        self.trades.values()
    }

    /// Fills belonging to one order
    pub fn for_order(&self, order_id: OrderId) -> impl Iterator<Item = &AccountTrade> {
        self.trades.values().filter(move |t| t.order_id == order_id)
    }
}

impl Collect<AccountTrade> for TradeSet {
    fn upsert(&mut self, item: AccountTrade) -> bool {
        match self.trades.get(&item.trade_id) {
            Some(existing) if !newer_or_equal(item.time, existing.time) || *existing == item => {
                false
            }
            _ => {
                self.trades.insert(item.trade_id, item);
                true
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

impl Mergeable for TradeSet {
    fn merge_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        for trade in incoming.trades.into_values() {
            changed |= self.upsert(trade);
        }
        changed
    }

    fn retain_within(&mut self, retention: &Retention) -> usize {
        evict_oldest(&mut self.trades, retention.max_trades)
    }
}

impl FromIterator<AccountTrade> for TradeSet {
    fn from_iter<I: IntoIterator<Item = AccountTrade>>(iter: I) -> Self {
        let mut set = TradeSet::default();
        for trade in iter {
            set.upsert(trade);
        }
        set
    }
}

// ============================================================================
// Orders: identity collection
// ============================================================================

/// Latest known state of each order of one symbol, in arrival order
///
/// An update to a known order id removes the old entry and appends the new
/// one, so an order appears exactly once. Updates older than the held state
/// are ignored.
#[derive(Debug, Clone, Default)]
pub struct OrderSet {
    /// Orders keyed by arrival sequence
    orders: BTreeMap<u64, Order>,
    /// Arrival sequence of each held order id
    index: HashMap<OrderId, u64>,
    next_seq: u64,
}

impl OrderSet {
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.index
            .get(&order_id)
            .and_then(|seq| self.orders.get(seq))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Orders still working on the book
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.is_open())
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.orders.values().next().map(|o| &o.symbol)
    }
}

/// Same orders in the same arrival order; sequence numbering is local
impl PartialEq for OrderSet {
    fn eq(&self, other: &Self) -> bool {
        self.orders.len() == other.orders.len() && self.iter().eq(other.iter())
    }
}

impl Collect<Order> for OrderSet {
    fn upsert(&mut self, item: Order) -> bool {
        if let Some(&seq) = self.index.get(&item.order_id) {
            if let Some(existing) = self.orders.get(&seq)
                && (!newer_or_equal(item.updated_at, existing.updated_at) || *existing == item)
            {
                return false;
            }
            self.orders.remove(&seq);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(item.order_id, seq);
        self.orders.insert(seq, item);
        true
    }

    fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Mergeable for OrderSet {
    fn merge_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        for order in incoming.orders.into_values() {
            changed |= self.upsert(order);
        }
        changed
    }

    fn retain_within(&mut self, retention: &Retention) -> usize {
        let terminal = self
            .orders
            .values()
            .filter(|o| o.status.is_terminal())
            .count();
        let excess = terminal.saturating_sub(retention.max_terminal_orders);
        if excess == 0 {
            return 0;
        }

        let evicted: Vec<u64> = self
            .orders
            .iter()
            .filter(|(_, o)| o.status.is_terminal())
            .map(|(seq, _)| *seq)
            .take(excess)
            .collect();
        for seq in &evicted {
            if let Some(order) = self.orders.remove(seq) {
                self.index.remove(&order.order_id);
            }
        }
        evicted.len()
    }
}

impl FromIterator<Order> for OrderSet {
    fn from_iter<I: IntoIterator<Item = Order>>(iter: I) -> Self {
        let mut set = OrderSet::default();
        for order in iter {
            set.upsert(order);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use strata_core::{KlineInterval, OrderStatus, OrderType, Side};

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn bar(open_secs: i64, event_secs: i64, close: rust_decimal::Decimal) -> Kline {
        Kline {
            symbol: Symbol::new("BTCUSDT"),
            interval: KlineInterval::OneMinute,
            open_time: t(open_secs),
            close_time: t(open_secs + 59),
            event_time: t(event_secs),
            open: dec!(100),
            high: dec!(110),
            low: dec!(90),
            close,
            volume: dec!(1),
            is_closed: event_secs >= open_secs + 59,
        }
    }

    fn order(order_id: OrderId, executed: rust_decimal::Decimal, at: i64) -> Order {
        let status = if executed.is_zero() {
            OrderStatus::New
        } else {
            OrderStatus::PartiallyFilled
        };
        Order::new(
            "BTCUSDT",
            order_id,
            format!("c-{order_id}"),
            Side::Buy,
            OrderType::Limit,
            dec!(100),
            dec!(10),
            t(0),
        )
        .with_execution(executed, status, t(at))
    }

    #[test]
    fn test_ticker_late_arrival_does_not_overwrite() {
        let mut held = MiniTicker::last_price("XYZ", dec!(2), t(2));
        let late = MiniTicker::last_price("XYZ", dec!(1), t(1));

        assert!(!held.merge_from(late));
        assert_eq!(held.close, dec!(2));

        assert!(held.merge_from(MiniTicker::last_price("XYZ", dec!(3), t(3))));
        assert_eq!(held.close, dec!(3));
    }

    #[test]
    fn test_ticker_merge_is_idempotent() {
        let mut held = MiniTicker::last_price("XYZ", dec!(2), t(2));
        assert!(!held.merge_from(held.clone()));
    }

    #[test]
    fn test_balance_last_write_wins_by_event_time() {
        let mut held = Balance::new("BTC", dec!(1), dec!(0), t(10));
        assert!(!held.merge_from(Balance::new("BTC", dec!(5), dec!(0), t(5))));
        assert!(held.merge_from(Balance::new("BTC", dec!(2), dec!(1), t(10))));
        assert_eq!(held.total(), dec!(3));
    }

    #[test]
    fn test_kline_upsert_per_open_time() {
        let mut set = KlineSet::default();
        assert!(set.upsert(bar(0, 10, dec!(101))));
        assert!(set.upsert(bar(60, 70, dec!(105))));
        // Older revision of the first bar is ignored
        assert!(!set.upsert(bar(0, 5, dec!(99))));
        assert!(set.upsert(bar(0, 59, dec!(102))));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&t(0)).unwrap().close, dec!(102));
        assert_eq!(set.latest().unwrap().open_time, t(60));
        assert_eq!(set.last_closed().unwrap().open_time, t(0));
        assert_eq!(set.key().unwrap().to_string(), "BTCUSDT@1m");
    }

    #[test]
    fn test_kline_merge_order_independent() {
        let updates = [bar(0, 10, dec!(101)), bar(0, 30, dec!(103)), bar(60, 61, dec!(104))];

        let forward: KlineSet = updates.iter().cloned().collect();
        let backward: KlineSet = updates.iter().rev().cloned().collect();
        assert_eq!(forward, backward);

        let mut twice = forward.clone();
        assert!(!twice.merge_from(forward.clone()));
        assert_eq!(twice, forward);
    }

    #[test]
    fn test_trade_set_dedupes_by_id() {
        let trade = AccountTrade {
            symbol: Symbol::new("BTCUSDT"),
            trade_id: 7,
            order_id: 1,
            price: dec!(100),
            qty: dec!(0.5),
            commission: dec!(0.01),
            is_buyer: true,
            time: t(1),
        };
        let mut set = TradeSet::default();
        assert!(set.upsert(trade.clone()));
        assert!(!set.upsert(trade));
        assert_eq!(set.len(), 1);
        assert_eq!(set.for_order(1).count(), 1);
    }

    #[test]
    fn test_order_update_replaces_not_duplicates() {
        let mut set: OrderSet = [order(1, dec!(0), 0), order(2, dec!(0), 1)].into_iter().collect();

        assert!(set.upsert(order(1, dec!(4), 5)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).unwrap().executed_qty, dec!(4));
        // Reinserted at the back
        assert_eq!(set.iter().last().unwrap().order_id, 1);

        // Stale update ignored
        assert!(!set.upsert(order(1, dec!(2), 3)));
        assert_eq!(set.get(1).unwrap().executed_qty, dec!(4));
    }

    #[test]
    fn test_kline_retention_keeps_latest_bars() {
        let retention = Retention {
            max_klines: 100,
            ..Retention::default()
        };
        let mut set = KlineSet::default();
        for i in 0..10_000i64 {
            let open = i * 60;
            set.upsert(bar(open, open + 59, dec!(100)));
            set.retain_within(&retention);
        }

        assert_eq!(set.len(), 100);
        assert_eq!(set.latest().unwrap().open_time, t(9_999 * 60));
        assert_eq!(set.iter().next().unwrap().open_time, t(9_900 * 60));

        // A bar older than the window is inserted, then evicted again
        set.upsert(bar(0, 59, dec!(1)));
        assert_eq!(set.retain_within(&retention), 1);
        assert!(set.get(&t(0)).is_none());
    }

    #[test]
    fn test_trade_retention_drops_oldest_ids() {
        let retention = Retention {
            max_trades: 3,
            ..Retention::default()
        };
        let mut set: TradeSet = (1..=5)
            .map(|id| AccountTrade {
                symbol: Symbol::new("BTCUSDT"),
                trade_id: id,
                order_id: 1,
                price: dec!(100),
                qty: dec!(0.1),
                commission: dec!(0),
                is_buyer: false,
                time: t(id),
            })
            .collect();

        assert_eq!(set.retain_within(&retention), 2);
        assert_eq!(set.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(set.retain_within(&retention), 0);
    }

    #[test]
    fn test_order_retention_evicts_oldest_terminal_only() {
        let retention = Retention {
            max_terminal_orders: 2,
            ..Retention::default()
        };
        let mut set = OrderSet::default();
        for id in 1..=10 {
            set.upsert(order(id, dec!(0), 0));
            if id % 2 == 0 {
                set.upsert(order(id, dec!(10), 1).with_execution(dec!(10), OrderStatus::Filled, t(1)));
            }
        }

        // Five filled, five open
        assert_eq!(set.retain_within(&retention), 3);
        assert_eq!(set.len(), 7);
        assert_eq!(set.open_orders().count(), 5);
        for evicted in [2, 4, 6] {
            assert!(set.get(evicted).is_none());
        }
        assert_eq!(set.get(10).unwrap().status, OrderStatus::Filled);

        // Evicted ids no longer shadow fresh state
        assert!(set.upsert(order(2, dec!(0), 5)));
        assert_eq!(set.get(2).unwrap().status, OrderStatus::New);
    }

    #[test]
    fn test_scalars_retain_everything() {
        let mut held = MiniTicker::last_price("XYZ", dec!(2), t(2));
        assert_eq!(held.retain_within(&Retention::default()), 0);
    }

    #[test]
    fn test_order_set_equality_ignores_sequence_numbers() {
        let mut churned: OrderSet = [order(1, dec!(0), 0)].into_iter().collect();
        churned.upsert(order(1, dec!(2), 1));
        let fresh: OrderSet = [order(1, dec!(2), 1)].into_iter().collect();
        assert_eq!(churned, fresh);
    }

    #[test]
    fn test_open_orders_excludes_terminal() {
        let filled = order(3, dec!(10), 9).with_execution(dec!(10), OrderStatus::Filled, t(9));
        let set: OrderSet = [order(1, dec!(0), 0), filled].into_iter().collect();
        assert_eq!(set.open_orders().count(), 1);
        assert_eq!(set.symbol().unwrap().as_str(), "BTCUSDT");
    }
}
