//! Strata - reactive partitioned market-state cache
//!
//! Runs the cache against the simulated exchange feed until Ctrl-C.
//!
//! Configuration comes from the JSON file named by `STRATA_CONFIG`, or the
//! embedded defaults. Log level via `RUST_LOG` (default `info`).

use anyhow::Context;
use log::{error, info};
use strata_runner::{StrataService, Stores, load_config, load_default_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::var("STRATA_CONFIG") {
        Ok(path) => load_config(&path).with_context(|| format!("loading config from {}", path))?,
        Err(_) => load_default_config().context("loading embedded config")?,
    };

    let mut service = StrataService::start(config, Stores::in_memory())
        .await
        .context("starting strata")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
        }
        exit = service.wait() => {
            match exit {
                Ok(exit) => info!("Ingestion stopped: {:?}", exit),
                Err(e) => error!("Ingestion failed: {}", e),
            }
        }
    }

    service.report();
    service.shutdown().await?;
    Ok(())
}
