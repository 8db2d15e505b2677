//! Service - the running Strata process
//!
//! Ties together:
//! - Bootstrap wiring (partitions, conflation buffers, routes)
//! - The simulated exchange feed
//! - The ingestion pump under its reconnect loop
//! - The market view served to strategy executors
//! - A periodic report

use log::{info, warn};
use std::sync::Arc;
use strata_core::KlineKey;
use strata_gateway::{IngestionPump, PumpExit, PumpStats};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::{Bootstrap, Directories, Stores};
use crate::config::StrataConfig;
use crate::error::RunnerError;
use crate::event_feed::{FeedConnector, FeedSimulator};
use crate::reconnect::run_with_reconnect;
use crate::view::MarketView;

/// A started Strata process
pub struct StrataService {
    config: StrataConfig,
    cancel: CancellationToken,
    directories: Directories,
    pump: IngestionPump,
    view: Arc<MarketView>,
    connector: FeedConnector,
    ingestion: Option<JoinHandle<Result<PumpExit, RunnerError>>>,
    background: Vec<JoinHandle<()>>,
}

impl StrataService {
    /// Wire everything and start the feed, the pump and the report loop
    pub async fn start(config: StrataConfig, stores: Stores) -> Result<Self, RunnerError> {
        config.validate()?;
        info!("Starting Strata with {} symbols", config.symbols.len());

        let cancel = CancellationToken::new();
        let bootstrap = Bootstrap::build(&config, stores, &cancel).await?;
        let pump = IngestionPump::new(bootstrap.routes);
        let view = Arc::new(MarketView::new(
            bootstrap.directories.clone(),
            bootstrap.replica_options,
            &cancel,
        ));

        let feed = FeedSimulator::new(
            config.feed.clone(),
            config.symbols.clone(),
            config.assets.clone(),
            config.kline_intervals.clone(),
        );
        let connector = feed.connector();

        let ingestion = tokio::spawn({
            let pump = pump.clone();
            let connector = connector.clone();
            let retry = config.reconnect.clone();
            let cancel = cancel.clone();
            async move {
                run_with_reconnect(&pump, || Ok(connector.connect()), &retry, &cancel).await
            }
        });

        let mut background = vec![tokio::spawn(feed.run(cancel.clone()))];
        if config.report_interval().is_some() {
            background.push(tokio::spawn(report_loop(
                config.clone(),
                Arc::clone(&view),
                pump.clone(),
                cancel.clone(),
            )));
        }

        Ok(Self {
            config,
            cancel,
            directories: bootstrap.directories,
            pump,
            view,
            connector,
            ingestion: Some(ingestion),
            background,
        })
    }

    pub fn view(&self) -> &Arc<MarketView> {
        &self.view
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    pub fn connector(&self) -> &FeedConnector {
        &self.connector
    }

    pub fn pump_stats(&self) -> PumpStats {
        self.pump.stats()
    }

    /// Log one market view report now
    pub fn report(&self) {
        log_report(&self.config, &self.view, &self.pump);
    }

    /// Wait for ingestion to stop on its own
    ///
    /// Cancel-safe: dropping the future leaves ingestion running.
    pub async fn wait(&mut self) -> Result<PumpExit, RunnerError> {
        let Some(handle) = self.ingestion.as_mut() else {
            return Ok(PumpExit::Cancelled);
        };
        let result = handle.await;
        self.ingestion = None;
        result?
    }

    /// Stop every background loop and shut the partitions down
    pub async fn shutdown(mut self) -> Result<PumpExit, RunnerError> {
        info!("Shutting down Strata");
        self.cancel.cancel();

        let exit = self.wait().await;
        for task in self.background.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        self.directories.shutdown_all().await;

        info!("Strata stopped: {:?}", self.pump.stats());
        exit
    }
}

async fn report_loop(
    config: StrataConfig,
    view: Arc<MarketView>,
    pump: IngestionPump,
    cancel: CancellationToken,
) {
    let Some(period) = config.report_interval() else {
        return;
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => log_report(&config, &view, &pump),
        }
    }
}

fn log_report(config: &StrataConfig, view: &MarketView, pump: &IngestionPump) {
    let stats = pump.stats();
    info!(
        "Ingestion: {} received, {} routed, {} displaced, {} unroutable, {} malformed, {} error frames, {} overflowed",
        stats.received,
        stats.routed,
        stats.displaced,
        stats.unroutable,
        stats.malformed,
        stats.error_frames,
        stats.overflowed
    );

    for symbol in &config.symbols {
        let price = view
            .last_price(symbol)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let bars: usize = config
            .kline_intervals
            .iter()
            .filter_map(|&i| view.klines(&KlineKey::new(symbol.clone(), i)))
            .map(|set| set.len())
            .sum();
        let trades = view.trades(symbol).map(|t| t.len()).unwrap_or(0);
        info!(
            "{}: last {} | {} bars | {} open orders | {} trades",
            symbol,
            price,
            bars,
            view.open_orders(symbol).len(),
            trades
        );
    }

    for asset in &config.assets {
        if let Some(balance) = view.balance(asset) {
            info!("{}: free {} locked {}", asset, balance.free, balance.locked);
        }
    }
}
