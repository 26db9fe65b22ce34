//! Stockline Sync - background synchronization for the offline inventory store.
//!
//! Opens the local store, connects it to the remote API and keeps the two
//! reconciled until interrupted.

use std::sync::Arc;
use stockline_client::{
    Config, Connectivity, HttpRemote, LocalStore, Scheduler, SyncEngine,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockline_client=debug,stockline_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Stockline sync against {}", config.api_url);

    let store = LocalStore::open(&config.database_url).await?;
    let remote = Arc::new(HttpRemote::from_config(&config)?);
    let engine = Arc::new(SyncEngine::with_system_clock(
        store,
        remote,
        config.sync.clone(),
    ));

    let connectivity = Connectivity::new(true);
    let mut scheduler = Scheduler::new(engine.clone(), connectivity.subscribe());
    scheduler.start(config.sync_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.stop().await;

    let pending = engine.pending_count().await?;
    let failed = engine.failed_count().await?;
    tracing::info!(pending, failed, "Queue state at shutdown");
    engine.store().close().await;

    Ok(())
}
