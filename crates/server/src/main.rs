// crates/server/src/main.rs
//! Agent status server binary.
//!
//! Opens the SQLite update log, builds the status hub and serves the HTTP API
//! until Ctrl-C or SIGTERM. Shutdown cancels every open event stream so the
//! server can drain.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent_status_db::Database;
use agent_status_server::{create_app, init_metrics, AppState, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "warn,agent_status_server=info,agent_status_core=info,agent_status_db=info".into()
        }))
        .init();

    let cli = Cli::parse();

    init_metrics();

    let db = Database::new(&cli.database)
        .await
        .with_context(|| format!("opening database {}", cli.database.display()))?;

    let state = AppState::new(db, cli.hub_config(), cli.auth_tokens());
    let shutdown = state.shutdown.clone();
    let app = create_app(state, cli.origins());

    let addr = cli.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        database = %cli.database.display(),
        subscriber_capacity = cli.subscriber_capacity,
        "Agent status server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then cancel `shutdown` so open streams end.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }

    shutdown.cancel();
}
