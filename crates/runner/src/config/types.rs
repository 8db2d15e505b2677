use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use strata_cache::CacheConfig;
use strata_core::{Asset, KlineInterval, Symbol};

/// Root configuration for a Strata process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Instruments to cache tickers, klines, orders and trades for
    pub symbols: Vec<Symbol>,
    /// Assets to cache balances for
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default = "default_kline_intervals")]
    pub kline_intervals: Vec<KlineInterval>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    /// Reconnection of the ingestion source after a dropped connection
    #[serde(default)]
    pub reconnect: RetryConfig,
    /// Retry of a partition whose initial load failed
    #[serde(default)]
    pub activation: RetryConfig,
    /// Period of the market view report, 0 disables it
    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,
}

impl StrataConfig {
    /// Minimal configuration for the given symbols, everything else defaulted
    pub fn for_symbols(symbols: &[&str]) -> Self {
        StrataConfig {
            symbols: symbols.iter().map(|s| Symbol::new(*s)).collect(),
            assets: Vec::new(),
            kline_intervals: default_kline_intervals(),
            cache: CacheConfig::default(),
            feed: FeedConfig::default(),
            reconnect: RetryConfig::default(),
            activation: RetryConfig::default(),
            report_interval_ms: default_report_interval(),
        }
    }

    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval_ms > 0).then(|| Duration::from_millis(self.report_interval_ms))
    }
}

/// Simulated exchange feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Delay between two feed ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Fixed seed for a reproducible feed; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Starting price per symbol; symbols not listed start at 100
    #[serde(default)]
    pub initial_prices: BTreeMap<Symbol, Decimal>,
    /// Random walk step per tick, as a fraction of price
    #[serde(default = "default_price_volatility")]
    pub price_volatility: Decimal,
    /// Chance per tick of an order, fill or balance event
    #[serde(default = "default_account_event_probability")]
    pub account_event_probability: f64,
    /// Chance per tick of an exchange error frame
    #[serde(default = "default_error_frame_probability")]
    pub error_frame_probability: f64,
    /// Broadcast capacity between feed and ingestion source
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Drop every connection this often, 0 never
    #[serde(default)]
    pub disconnect_every_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            tick_interval_ms: default_tick_interval(),
            seed: None,
            initial_prices: BTreeMap::new(),
            price_volatility: default_price_volatility(),
            account_event_probability: default_account_event_probability(),
            error_frame_probability: default_error_frame_probability(),
            channel_capacity: default_channel_capacity(),
            disconnect_every_ms: 0,
        }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn disconnect_every(&self) -> Option<Duration> {
        (self.disconnect_every_ms > 0).then(|| Duration::from_millis(self.disconnect_every_ms))
    }

    pub fn initial_price(&self, symbol: &Symbol) -> Decimal {
        self.initial_prices.get(symbol).copied().unwrap_or(dec!(100))
    }
}

/// Fixed-delay retry with a bounded number of attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            delay_ms: default_retry_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_kline_intervals() -> Vec<KlineInterval> {
    vec![KlineInterval::OneMinute]
}

fn default_report_interval() -> u64 {
    5000
}

fn default_tick_interval() -> u64 {
    20
}

fn default_price_volatility() -> Decimal {
    dec!(0.0005)
}

fn default_account_event_probability() -> f64 {
    0.05
}

fn default_error_frame_probability() -> f64 {
    0.001
}

fn default_channel_capacity() -> usize {
    4096
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}
