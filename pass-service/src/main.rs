//! # Device Pass Service
//!
//! Device registry and access pass ledger behind a REST API.
//!
//! ## Running
//!
//! ```bash
//! # Optional settings
//! export PASS_SERVICE_PORT=8080
//! export PASS_DEVICE_ID_MODE=hashed      # or sequential
//! export PASS_SEED_SAMPLE_DATA=true
//! export PASS_SNAPSHOT_PATH=./data/ledger.json
//!
//! # Run the service
//! cargo run --release --bin pass-service
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pass_service::{
    api, clock::SystemClock, ledger::Ledger, seed, snapshot::SnapshotStore, AppState,
};
use shared::config::ServiceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the level can be configured
    let config = ServiceConfig::from_env()?;
    config.validate()?;

    let level: Level = config
        .log
        .level
        .parse()
        .with_context(|| format!("invalid log level '{}'", config.log.level))?;

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Device Pass Service");
    info!("Version: {}", shared::VERSION);
    info!(
        id_mode = %config.ledger.id_mode,
        seed = config.ledger.seed_sample_data,
        persist = config.storage.persist,
        "Configuration loaded"
    );

    // Restore the ledger from disk when persistence is enabled
    let snapshots = config
        .storage
        .effective_path(dirs::home_dir())
        .map(SnapshotStore::new);

    let ledger = match snapshots {
        Some(ref store) => match store.load().await? {
            Some(snapshot) => Ledger::from_snapshot(snapshot)?,
            None => Ledger::new(),
        },
        None => Ledger::new(),
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(ledger),
        Arc::new(SystemClock),
        snapshots,
    ));

    if config.ledger.seed_sample_data {
        let summary = seed::seed_sample_data(&state.registry, &state.passes)?;
        if !summary.devices.is_empty() {
            state.persist().await?;
        }
    }

    // Create router with shared state
    let app = api::create_router(Arc::clone(&state));

    // Start server
    let bind_addr = config.api.bind_addr();
    info!(address = %bind_addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Server running at http://{}", bind_addr);
    info!(devices = state.registry.count(), "Ledger ready");

    axum::serve(listener, app).await?;

    Ok(())
}
