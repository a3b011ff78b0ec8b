// =============================================================================
// Entry Signal - Main Entry Point
// =============================================================================
//
// The evaluation loop starts stopped unless `autostart` is set; it is started
// and stopped through the API. Learning state is persisted under `data_dir`.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod decision_envelope;
mod entry_plan;
mod error;
mod events;
mod indicators;
mod instrument;
mod learning;
mod market_data;
mod regime;
mod risk;
mod runtime_config;
mod scheduler;
mod signals;
mod storage;
mod strategy;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::storage::FileStore;

const CONFIG_PATH: &str = "signal_config.json";

/// Apply `SIGNAL_*` environment overrides on top of the file config.
fn apply_env_overrides(config: &mut RuntimeConfig) {
    if let Ok(v) = std::env::var("SIGNAL_INSTRUMENT") {
        let v = v.trim().to_uppercase();
        if !v.is_empty() {
            config.instrument = v;
        }
    }
    if let Ok(v) = std::env::var("SIGNAL_INTERVAL_SECS") {
        match v.trim().parse::<u32>() {
            Ok(secs) if secs > 0 => config.interval_secs = secs,
            _ => warn!(value = %v, "ignoring invalid SIGNAL_INTERVAL_SECS"),
        }
    }
    if let Ok(v) = std::env::var("SIGNAL_BIND_ADDR") {
        config.bind_addr = v;
    }
    if let Ok(v) = std::env::var("SIGNAL_DATA_DIR") {
        config.data_dir = v;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Entry Signal - starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut config);
    config
        .validate()
        .context("runtime config invalid after environment overrides")?;

    info!(
        instrument = %config.instrument,
        interval_secs = config.interval_secs,
        confluence_mode = config.confluence_mode,
        guard_mode = config.guard_mode,
        autostart = config.autostart,
        "Configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let store = FileStore::open(&config.data_dir)
        .with_context(|| format!("cannot open data directory {}", config.data_dir))?;
    let admin_token = std::env::var("SIGNAL_ADMIN_TOKEN").ok();
    if admin_token.as_deref().map_or(true, str::is_empty) {
        warn!("SIGNAL_ADMIN_TOKEN not set - authenticated endpoints will refuse all requests");
    }
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, Arc::new(store), admin_token).with_config_path(CONFIG_PATH));

    // ── 3. Scheduler ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(scheduler::run_scheduler(state.clone(), shutdown_rx));

    // ── 4. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");
    let app = api::rest::router(state.clone());
    let mut api_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received - stopping gracefully");
    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;
    let _ = server.await;

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Entry Signal shut down complete.");
    Ok(())
}
