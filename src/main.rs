use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    clock::{Clock, SystemClock},
    paste_service::{PasteLimits, PasteService},
    paste_store::PasteStore,
    reaper::Reaper,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting paste-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    ensure_sqlite_parent_dir(db_url)?;

    let store = PasteStore::connect(db_url, cfg.max_connections, cfg.store_timeout).await?;

    // Schema setup happens here, once, before anything is served.
    store.init_schema().await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limits = PasteLimits {
        max_content_bytes: cfg.max_content_bytes,
        ..PasteLimits::default()
    };
    let pastes = PasteService::new(store.clone(), clock.clone(), limits);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = Reaper::new(store.clone(), clock, cfg.reaper_interval).spawn(shutdown_rx);

    // --- Build router ---
    let app: Router =
        routes::routes::routes().with_state(state::AppState::new(pastes, &cfg.public_base_url));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Stop background work ---
    let _ = shutdown_tx.send(true);
    if let Err(err) = reaper.await {
        tracing::warn!("reaper task ended abnormally: {}", err);
    }
    store.db.close().await;

    Ok(())
}

/// Create the directory holding a file-backed SQLite database, if needed.
fn ensure_sqlite_parent_dir(db_url: &str) -> Result<()> {
    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    if db_path.is_empty() || db_path.starts_with(":memory:") {
        return Ok(());
    }
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}

/// Resolve when the process is asked to stop (Ctrl-C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
