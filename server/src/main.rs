//! FlightSurety Oracle Server
//!
//! Answers `OracleRequest` events from the FlightSurety contracts on behalf of
//! the configured oracle indexes, and serves a small HTTP API next to it.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flightsurety_oracle::abi::OracleContract;
use flightsurety_oracle::app_state::AppState;
use flightsurety_oracle::config::{IndexSource, OracleConfig};
use flightsurety_oracle::routes;
use flightsurety_oracle::services::{OracleService, OracleStats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OracleConfig::from_env().context("invalid oracle configuration")?;
    let contract = OracleContract::load(config.contracts.responder_contract())
        .context("failed to load oracle contract ABI")?;
    if config.index_source == IndexSource::Contract {
        contract
            .encode_get_my_indexes()
            .context("ORACLE_INDEXES=contract needs getMyIndexes in the contract ABI")?;
    }

    let stats = Arc::new(OracleStats::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let service = OracleService::new(config.clone(), contract, stats.clone());
    let oracle = {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = service.run(shutdown_rx).await;
            // The HTTP API has nothing to report once the oracle is gone.
            let _ = shutdown_tx.send(true);
            result
        })
    };

    let app = routes::app(AppState::new(stats), &config.cors_allowed_origins);

    info!("Server starting on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("HTTP server failed")?;

    oracle
        .await
        .context("oracle task failed")?
        .context("oracle service stopped")?;

    Ok(())
}

/// Resolves on Ctrl-C or when the oracle service stops, and tells the other
/// side to stop as well.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let mut stopped = shutdown_tx.subscribe();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        }
        _ = stopped.wait_for(|stop| *stop) => {
            info!("oracle service stopped, shutting down HTTP server");
        }
    }

    let _ = shutdown_tx.send(true);
}
