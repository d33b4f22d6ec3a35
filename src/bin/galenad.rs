//! Main entry point for the galena-miner daemon.

use galena_miner::config::Config;
use galena_miner::stratum::{Client, ClientConfig};
use galena_miner::tracing::{self, prelude::*};
use tokio::signal::unix::{self, SignalKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init();

    let config = Config::from_env()?;

    let client = Client::new(ClientConfig {
        pool_address: config.pool_address,
        login: config.login,
        password: config.password,
        algorithm: config.algorithm,
        miners_count: config.miners_count,
        ..ClientConfig::default()
    });

    let shutdown = client.shutdown_token();
    tokio::spawn(async move {
        let mut sigint = match unix::signal(SignalKind::interrupt()) {
            Ok(signal) => signal,
            Err(error) => {
                error!(%error, "Failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match unix::signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(error) => {
                error!(%error, "Failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        shutdown.cancel();
    });

    client.serve().await?;
    info!("Exiting.");
    Ok(())
}
