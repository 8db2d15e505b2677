//! End-to-end checks of the partition long-poll protocol and the
//! conflation -> partition -> replica pipeline.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use strata_cache::{
    CacheError, ConflationBuffer, ConflationOptions, KlineSet, LatestByEventTime, MemoryStore,
    MergeSink, OrderSet, PartitionCache, PartitionDirectory, PartitionOptions, ReadReplica,
    ReplicaOptions, Retention, SetSink, UpsertInto,
};
use strata_core::{
    Kline, KlineInterval, KlineKey, MiniTicker, Order, OrderStatus, OrderType, Side, Symbol,
    Timestamp,
};
use tokio_util::sync::CancellationToken;

fn t(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs)
}

fn tick(symbol: &str, close: Decimal, secs: i64) -> MiniTicker {
    MiniTicker::last_price(symbol, close, t(secs))
}

async fn ticker_partition(symbol: &str) -> PartitionCache<Symbol, MiniTicker> {
    let store: MemoryStore<Symbol, MiniTicker> = MemoryStore::new();
    PartitionCache::activate(Symbol::new(symbol), Arc::new(store), PartitionOptions::default())
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_abcusd_long_poll_scenario() {
    let _ = env_logger::try_init();
    let cache = ticker_partition("ABCUSD").await;
    assert!(cache.try_get().is_none());

    let v1 = cache.set(tick("ABCUSD", dec!(100), 1)).await.unwrap();
    let current = cache.get();
    assert_eq!(current.value().unwrap().close, dec!(100));
    assert_eq!(current.version, v1.version);

    // Nothing new: the poll times out
    let polled = cache.wait_for_change(v1.version, Duration::from_secs(5)).await;
    assert!(polled.is_none());

    // Parked poll is answered by the next write
    let poller = {
        let cache = cache.clone();
        let v1 = v1.clone();
        tokio::spawn(async move { cache.wait_for_change(v1.version, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.stats().await.unwrap().parked_waiters, 1);

    cache.set(tick("ABCUSD", dec!(101), 2)).await.unwrap();
    let v2 = poller.await.unwrap().expect("poll woken by write");
    assert_eq!(v2.value().unwrap().close, dec!(101));
    assert_ne!(v2.version, v1.version);
    assert!(v2.serial > v1.serial);
}

#[tokio::test]
async fn test_forward_progress_across_writes() {
    let cache = ticker_partition("ABCUSD").await;
    let mut seen = cache.get();

    for i in 1..=20 {
        cache.set(tick("ABCUSD", Decimal::from(100 + i), i)).await.unwrap();
        let next = cache
            .wait_for_change(seen.version, Duration::from_secs(1))
            .await
            .expect("a newer entry exists");
        assert_ne!(next.version, seen.version);
        assert!(next.serial > seen.serial);
        seen = next;
    }
    assert_eq!(seen.serial, 20);
}

#[tokio::test]
async fn test_concurrent_pollers_all_woken() {
    let cache = ticker_partition("ABCUSD").await;
    let known = cache.get().version;

    let pollers: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.wait_for_change(known, Duration::from_secs(30)).await })
        })
        .collect();
    tokio::task::yield_now().await;

    let written = cache.set(tick("ABCUSD", dec!(1), 1)).await.unwrap();
    for poller in pollers {
        let entry = poller.await.unwrap().unwrap();
        assert_eq!(entry.version, written.version);
    }
}

#[tokio::test(start_paused = true)]
async fn test_xyz_reordered_ticks_conflate_to_latest() {
    let cache = ticker_partition("XYZ").await;
    let buffer = ConflationBuffer::spawn(
        ConflationOptions::default().with_label("ticker:XYZ"),
        LatestByEventTime::new(),
        MergeSink(cache.clone()),
        &CancellationToken::new(),
    );

    buffer.push(tick("XYZ", dec!(20), 2));
    buffer.push(tick("XYZ", dec!(10), 1));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let held = cache.try_get().unwrap();
    assert_eq!(held.event_time, t(2));
    assert_eq!(held.close, dec!(20));
    assert_eq!(cache.get().serial, 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_in_later_cycle_does_not_regress_partition() {
    let cache = ticker_partition("XYZ").await;
    let buffer = ConflationBuffer::spawn(
        ConflationOptions::default(),
        LatestByEventTime::new(),
        MergeSink(cache.clone()),
        &CancellationToken::new(),
    );

    buffer.push(tick("XYZ", dec!(20), 2));
    tokio::time::sleep(Duration::from_millis(10)).await;
    buffer.push(tick("XYZ", dec!(10), 1));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(cache.try_get().unwrap().close, dec!(20));
    assert_eq!(cache.stats().await.unwrap().unchanged_merges, 1);
}

#[tokio::test(start_paused = true)]
async fn test_burst_through_set_sink_keeps_best() {
    let cache = ticker_partition("ABCUSD").await;
    let buffer = ConflationBuffer::spawn(
        ConflationOptions::default(),
        LatestByEventTime::new(),
        SetSink(cache.clone()),
        &CancellationToken::new(),
    );

    for i in (0..100).rev() {
        buffer.push(tick("ABCUSD", Decimal::from(1000 + i), i));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(cache.try_get().unwrap().close, dec!(1099));
    assert_eq!(cache.get().serial, 1);
}

fn bar(symbol: &str, open_secs: i64, event_secs: i64, close: Decimal) -> Kline {
    Kline {
        symbol: Symbol::new(symbol),
        interval: KlineInterval::OneMinute,
        open_time: t(open_secs),
        close_time: t(open_secs + 59),
        event_time: t(event_secs),
        open: dec!(100),
        high: dec!(200),
        low: dec!(50),
        close,
        volume: dec!(1),
        is_closed: event_secs >= open_secs + 59,
    }
}

#[tokio::test(start_paused = true)]
async fn test_kline_pipeline_replica_converges() {
    let _ = env_logger::try_init();
    let cancel = CancellationToken::new();
    let store: MemoryStore<KlineKey, KlineSet> = MemoryStore::new();
    let directory = PartitionDirectory::new(
        "klines",
        Arc::new(store.clone()),
        PartitionOptions::default(),
    );

    let key = KlineKey::new("BTCUSDT", KlineInterval::OneMinute);
    let cache = directory.get_or_activate(&key).await.unwrap();
    let buffer = ConflationBuffer::spawn(
        ConflationOptions::default(),
        UpsertInto::<KlineSet>::new(),
        MergeSink(cache.clone()),
        &cancel,
    );
    let replica = ReadReplica::spawn(cache.clone(), ReplicaOptions::default(), &cancel);

    buffer.push(bar("BTCUSDT", 0, 10, dec!(101)));
    buffer.push(bar("BTCUSDT", 0, 30, dec!(103)));
    tokio::time::sleep(Duration::from_millis(150)).await;
    buffer.push(bar("BTCUSDT", 60, 61, dec!(104)));
    buffer.push(bar("BTCUSDT", 0, 59, dec!(102)));

    // Writes stop; give the replica a few poll periods
    tokio::time::sleep(Duration::from_secs(5)).await;

    let authoritative = cache.try_get().unwrap();
    assert_eq!(replica.get().unwrap(), authoritative);
    replica.read(|bars| {
        let bars = bars.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars.get(&t(0)).unwrap().close, dec!(102));
        assert!(bars.get(&t(0)).unwrap().is_closed);
    });

    // Write-through landed in the store
    assert_eq!(store.get(&key).unwrap(), authoritative);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_bounded_kline_pipeline_stays_within_retention() {
    let cancel = CancellationToken::new();
    let store: MemoryStore<KlineKey, KlineSet> = MemoryStore::new();
    let retention = Retention {
        max_klines: 50,
        ..Retention::default()
    };
    let directory = PartitionDirectory::bounded(
        "klines",
        Arc::new(store.clone()),
        PartitionOptions::default().with_retention(retention),
    );

    let key = KlineKey::new("BTCUSDT", KlineInterval::OneMinute);
    let cache = directory.get_or_activate(&key).await.unwrap();
    let buffer = ConflationBuffer::spawn(
        ConflationOptions::default(),
        UpsertInto::<KlineSet>::new(),
        MergeSink(cache.clone()),
        &cancel,
    );
    let replica = ReadReplica::spawn(
        cache.clone(),
        ReplicaOptions {
            poll_period: Duration::from_millis(10),
            ..ReplicaOptions::default()
        },
        &cancel,
    );

    for i in 0..2000i64 {
        let open = i * 60;
        buffer.push(bar("BTCUSDT", open, open + 59, dec!(100)));
        if i % 100 == 0 {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    let authoritative = cache.try_get().unwrap();
    assert_eq!(authoritative.len(), 50);
    assert_eq!(authoritative.latest().unwrap().open_time, t(1999 * 60));
    assert_eq!(store.get(&key).unwrap().len(), 50);
    assert_eq!(replica.get().unwrap(), authoritative);
    assert_eq!(cache.stats().await.unwrap().evicted, 2000 - 50);
    cancel.cancel();
}

#[tokio::test]
async fn test_bounded_activation_trims_loaded_value() {
    let store: MemoryStore<KlineKey, KlineSet> = MemoryStore::new();
    let key = KlineKey::new("BTCUSDT", KlineInterval::OneMinute);
    store.seed(
        key.clone(),
        (0..20i64).map(|i| bar("BTCUSDT", i * 60, i * 60 + 59, dec!(1))).collect(),
    );

    let options = PartitionOptions::default().with_retention(Retention {
        max_klines: 5,
        ..Retention::default()
    });
    let bounded =
        PartitionCache::activate_bounded(key.clone(), Arc::new(store.clone()), options.clone())
            .await
            .unwrap();
    assert_eq!(bounded.try_get().unwrap().len(), 5);

    // Without a trim rule the same options keep everything
    let unbounded = PartitionCache::activate(key, Arc::new(store), options).await.unwrap();
    assert_eq!(unbounded.try_get().unwrap().len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_replica_drops_orders_the_partition_evicted() {
    let cancel = CancellationToken::new();
    let store: MemoryStore<Symbol, OrderSet> = MemoryStore::new();
    let options = PartitionOptions::default().with_retention(Retention {
        max_terminal_orders: 1,
        ..Retention::default()
    });
    let cache = PartitionCache::activate_bounded(Symbol::new("BTCUSDT"), Arc::new(store), options)
        .await
        .unwrap();
    let replica = ReadReplica::spawn(cache.clone(), ReplicaOptions::default(), &cancel);

    let order = |id: i64| {
        Order::new(
            "BTCUSDT",
            id,
            format!("grid-{id}"),
            Side::Sell,
            OrderType::Limit,
            dec!(50000),
            dec!(1),
            t(0),
        )
    };
    cache.merge(OrderSet::from_iter([order(1)])).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(replica.read(|set| set.unwrap().open_orders().count()), 1);

    // Order 1 fills and is evicted within one commit; the replica never sees the fill
    cache
        .merge(OrderSet::from_iter([
            order(1).with_execution(dec!(1), OrderStatus::Filled, t(5)),
            order(2).with_execution(dec!(1), OrderStatus::Filled, t(6)),
        ]))
        .await
        .unwrap();
    let authoritative = cache.try_get().unwrap();
    assert!(authoritative.get(1).is_none());
    assert_eq!(cache.stats().await.unwrap().evicted, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(replica.get().unwrap(), authoritative);
    assert_eq!(replica.read(|set| set.unwrap().open_orders().count()), 0);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_order_updates_replace_by_identity() {
    let cancel = CancellationToken::new();
    let store: MemoryStore<Symbol, OrderSet> = MemoryStore::new();
    let cache = PartitionCache::activate(
        Symbol::new("BTCUSDT"),
        Arc::new(store),
        PartitionOptions::default(),
    )
    .await
    .unwrap();
    let buffer = ConflationBuffer::spawn(
        ConflationOptions::default(),
        UpsertInto::<OrderSet>::new(),
        MergeSink(cache.clone()),
        &cancel,
    );
    let replica = ReadReplica::spawn(cache.clone(), ReplicaOptions::default(), &cancel);

    let placed = Order::new(
        "BTCUSDT",
        1,
        "grid-1",
        Side::Buy,
        OrderType::Limit,
        dec!(50000),
        dec!(1),
        t(0),
    );
    let partial = placed.with_execution(dec!(0.4), OrderStatus::PartiallyFilled, t(5));
    let filled = placed.with_execution(dec!(1), OrderStatus::Filled, t(9));

    buffer.push(placed.clone());
    tokio::time::sleep(Duration::from_millis(150)).await;
    // Fill arrives before the partial fill it supersedes
    buffer.push(filled);
    buffer.push(partial);
    tokio::time::sleep(Duration::from_secs(3)).await;

    replica.read(|orders| {
        let orders = orders.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders.get(1).unwrap().status, OrderStatus::Filled);
        assert_eq!(orders.open_orders().count(), 0);
    });
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_replica_self_write_then_poll() {
    let cancel = CancellationToken::new();
    let cache = ticker_partition("ABCUSD").await;
    let replica = ReadReplica::spawn(cache.clone(), ReplicaOptions::default(), &cancel);

    replica.set(tick("ABCUSD", dec!(100), 1)).await.unwrap();
    assert_eq!(replica.get().unwrap().close, dec!(100));

    // Another writer moves the partition on; the replica follows
    cache.set(tick("ABCUSD", dec!(101), 2)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(replica.get(), cache.try_get());
    cancel.cancel();
}

#[tokio::test]
async fn test_write_through_failure_keeps_partition_and_store_aligned() {
    let store: MemoryStore<Symbol, MiniTicker> = MemoryStore::new();
    let cache = PartitionCache::activate(
        Symbol::new("ABCUSD"),
        Arc::new(store.clone()),
        PartitionOptions::default(),
    )
    .await
    .unwrap();

    cache.set(tick("ABCUSD", dec!(100), 1)).await.unwrap();
    store.fail_persists(true);

    let err = cache.set(tick("ABCUSD", dec!(101), 2)).await.unwrap_err();
    assert!(matches!(err, CacheError::Persist { .. }));
    assert!(err.is_retryable());
    assert_eq!(cache.try_get().unwrap().close, dec!(100));
    assert_eq!(store.get(&Symbol::new("ABCUSD")).unwrap().close, dec!(100));

    store.fail_persists(false);
    cache.set(tick("ABCUSD", dec!(101), 2)).await.unwrap();
    assert_eq!(store.get(&Symbol::new("ABCUSD")).unwrap().close, dec!(101));
}

#[tokio::test]
async fn test_directory_coalesces_concurrent_activation() {
    let store: MemoryStore<Symbol, MiniTicker> = MemoryStore::new();
    store.seed(Symbol::new("ABCUSD"), tick("ABCUSD", dec!(99), 0));
    let directory = PartitionDirectory::new(
        "tickers",
        Arc::new(store.clone()),
        PartitionOptions::default(),
    );

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let directory = directory.clone();
            tokio::spawn(async move { directory.get_or_activate(&Symbol::new("abcusd")).await })
        })
        .collect();

    for handle in handles {
        let cache = handle.await.unwrap().unwrap();
        assert_eq!(cache.try_get().unwrap().close, dec!(99));
    }
    assert_eq!(store.load_count(), 1);
    assert_eq!(directory.len(), 1);
}

#[tokio::test]
async fn test_directory_retries_after_failed_activation() {
    let store: MemoryStore<Symbol, MiniTicker> = MemoryStore::new();
    let directory = PartitionDirectory::new(
        "tickers",
        Arc::new(store.clone()),
        PartitionOptions::default(),
    );
    let key = Symbol::new("ABCUSD");

    store.fail_loads(true);
    assert!(matches!(
        directory.get_or_activate(&key).await,
        Err(CacheError::Activation { .. })
    ));
    assert!(directory.get(&key).is_none());

    store.fail_loads(false);
    assert!(directory.get_or_activate(&key).await.is_ok());
    assert!(directory.get(&key).is_some());
    assert_eq!(store.load_count(), 2);
}
