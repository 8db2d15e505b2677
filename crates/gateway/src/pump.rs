//! Ingestion pump: decoded events in, conflation buffers out
//!
//! The pump never dies on a bad event. Malformed payloads, error frames and
//! events with no registered partition are logged, counted and dropped. Only
//! a fatal source error ends `run`, handing the failure back to the owner
//! who decides about reconnecting.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_cache::EnqueueOutcome;
use strata_core::MarketEvent;
use strata_ports::IngestionSource;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::routes::{RouteOutcome, RouteTable};

/// Why `run` returned without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    Cancelled,
    /// The source reported a clean end of stream
    SourceEnded,
}

/// Statistics for the pump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub received: u64,
    pub routed: u64,
    /// Routed by evicting an older queued item
    pub displaced: u64,
    pub unroutable: u64,
    pub malformed: u64,
    pub error_frames: u64,
    /// Dropped because the target buffer was full or closed
    pub overflowed: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    routed: AtomicU64,
    displaced: AtomicU64,
    unroutable: AtomicU64,
    malformed: AtomicU64,
    error_frames: AtomicU64,
    overflowed: AtomicU64,
}

/// Routes a heterogeneous event stream to per-partition conflation buffers
///
/// Reusable across reconnects: each `run` consumes one source connection.
#[derive(Clone)]
pub struct IngestionPump {
    routes: Arc<RouteTable>,
    counters: Arc<Counters>,
}

impl IngestionPump {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Pump events until cancelled, the source ends, or the source fails fatally
    pub async fn run<S>(
        &self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<PumpExit, GatewayError>
    where
        S: IngestionSource + ?Sized,
    {
        info!(
            "Ingestion pump started on {} ({} routes)",
            source.name(),
            self.routes.len()
        );

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingestion pump on {} cancelled", source.name());
                    return Ok(PumpExit::Cancelled);
                }
                next = source.next_event() => next,
            };

            match next {
                Ok(Some(event)) => self.dispatch(event).await,
                Ok(None) => {
                    info!("Ingestion source {} ended", source.name());
                    return Ok(PumpExit::SourceEnded);
                }
                Err(e) if !e.is_fatal() => {
                    self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!("Dropping undecodable frame from {}: {}", source.name(), e);
                }
                Err(e) => {
                    error!("Ingestion source {} failed: {}", source.name(), e);
                    return Err(GatewayError::Source {
                        source_name: source.name().to_string(),
                        error: e,
                    });
                }
            }
        }
    }

    /// Validate and route one event
    pub async fn dispatch(&self, event: MarketEvent) {
        let c = &self.counters;
        c.received.fetch_add(1, Ordering::Relaxed);

        if let MarketEvent::Error(frame) = &event {
            c.error_frames.fetch_add(1, Ordering::Relaxed);
            warn!("Exchange error frame {}: {}", frame.code, frame.message);
            return;
        }

        if let Err(e) = event.validate() {
            c.malformed.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Dropping malformed {} event for {}: {}",
                event.kind(),
                event.partition_label(),
                e
            );
            return;
        }

        let kind = event.kind();
        let label = event.partition_label();
        match self.routes.route(event).await {
            RouteOutcome::Routed(EnqueueOutcome::Accepted) => {
                c.routed.fetch_add(1, Ordering::Relaxed);
            }
            RouteOutcome::Routed(EnqueueOutcome::Displaced) => {
                c.routed.fetch_add(1, Ordering::Relaxed);
                c.displaced.fetch_add(1, Ordering::Relaxed);
            }
            RouteOutcome::Routed(EnqueueOutcome::Dropped | EnqueueOutcome::Closed) => {
                // The buffer already logged the overflow
                c.overflowed.fetch_add(1, Ordering::Relaxed);
                debug!("Dropped {} event for {}: buffer unavailable", kind, label);
            }
            RouteOutcome::Unroutable => {
                c.unroutable.fetch_add(1, Ordering::Relaxed);
                warn!("No route for {} event on {}", kind, label);
            }
        }
    }

    pub fn stats(&self) -> PumpStats {
        let c = &self.counters;
        PumpStats {
            received: c.received.load(Ordering::Relaxed),
            routed: c.routed.load(Ordering::Relaxed),
            displaced: c.displaced.load(Ordering::Relaxed),
            unroutable: c.unroutable.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            error_frames: c.error_frames.load(Ordering::Relaxed),
            overflowed: c.overflowed.load(Ordering::Relaxed),
        }
    }
}
