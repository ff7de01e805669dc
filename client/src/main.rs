//! Tally sync agent - keeps the offline mutation queue flowing to the API.
//!
//! Probes the API for reachability and replays queued expense and income
//! writes whenever it comes back, until interrupted.

use std::sync::Arc;

use tally_client::{
    Config, Connectivity, ConnectivityProbe, ConnectivityTrigger, FileStore, HttpMutationApi,
    SyncService,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_client=debug,tally_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Tally sync agent for {}", config.api_url);

    // Open persisted state
    let storage = Arc::new(FileStore::open(&config.data_dir)?);
    tracing::info!("Using data directory {}", config.data_dir.display());

    let api = HttpMutationApi::new(
        &config.api_url,
        config.request_timeout,
        config.auth_token.clone(),
    )?;
    let connectivity = Connectivity::new(false);
    let service = SyncService::new(storage, api, connectivity.clone(), config.retry_policy());

    let status = service.status();
    tracing::info!(
        client_id = %service.client_id(),
        pending = status.pending_count,
        unsynced_expenses = status.unsynced_expense_count,
        unsynced_income = status.unsynced_income_count,
        "Sync state loaded"
    );

    // Start background tasks
    let probe = ConnectivityProbe::new(
        &config.api_url,
        config.probe_interval,
        config.request_timeout,
    )?
    .spawn(connectivity.clone());
    let trigger = ConnectivityTrigger::subscribe(service.clone(), connectivity, config.sync_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    trigger.unsubscribe();
    probe.unsubscribe();

    let status = service.status();
    tracing::info!(
        pending = status.pending_count,
        evicted = status.evicted_count,
        "Final sync state"
    );

    Ok(())
}
