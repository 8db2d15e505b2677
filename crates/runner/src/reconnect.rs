//! Reconnect loop around the ingestion pump
//!
//! The pump hands a fatal source error back to its owner; this is the owner.
//! Each failure costs one attempt, a connection that delivered events resets
//! the count.

use log::{error, info, warn};
use strata_gateway::{GatewayError, IngestionPump, PumpExit};
use strata_ports::{IngestionSource, SourceError};
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::RunnerError;

/// Run `pump` over connections from `connect` until cancelled, the source
/// ends, or `retry.max_attempts` consecutive connections fail
pub async fn run_with_reconnect<S, F>(
    pump: &IngestionPump,
    mut connect: F,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<PumpExit, RunnerError>
where
    S: IngestionSource,
    F: FnMut() -> Result<S, SourceError>,
{
    let mut failures = 0u32;

    loop {
        let received_before = pump.stats().received;

        let failure = match connect() {
            Ok(mut source) => {
                info!("Ingestion connected to {}", source.name());
                match pump.run(&mut source, cancel).await {
                    Ok(exit) => return Ok(exit),
                    Err(e) => e,
                }
            }
            Err(e) => GatewayError::Source {
                source_name: "connect".to_string(),
                error: e,
            },
        };

        if pump.stats().received > received_before {
            failures = 0;
        }
        failures += 1;

        if failures >= retry.max_attempts {
            error!(
                "Ingestion giving up after {} consecutive failures: {}",
                failures, failure
            );
            return Err(RunnerError::ReconnectExhausted {
                attempts: failures,
                last: failure,
            });
        }

        warn!(
            "Ingestion connection lost ({}), reconnecting in {:?} (attempt {}/{})",
            failure,
            retry.delay(),
            failures,
            retry.max_attempts
        );

        tokio::select! {
            _ = cancel.cancelled() => return Ok(PumpExit::Cancelled),
            _ = tokio::time::sleep(retry.delay()) => {}
        }
    }
}
