//! qgate API Server
//!
//! Authorization gateway in front of a Qdrant-compatible vector database.
//!
//! Configuration is read from the TOML file named by `QGATE_CONFIG`
//! (optional) and `QGATE_*` environment variables.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use qgate_api::{create_router, state::AppState};
use qgate_core::config::{AppConfig, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("QGATE_CONFIG").ok().map(PathBuf::from);

    // Load configuration
    let config = AppConfig::load(config_path.clone()).context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.logging);

    config.validate().context("Invalid configuration")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let upstream = config.upstream.url.clone();

    // Create application state
    let state = Arc::new(AppState::new(config).context("Failed to load API keys")?);
    tracing::info!(keys = state.key_count(), "API key set loaded");

    spawn_reload_listener(state.clone(), config_path);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("qgate listening on http://{}", addr);
    tracing::info!("Forwarding authorized requests to {}", upstream);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "qgate_api={level},qgate_core={level},audit=info,tower_http=info",
            level = logging.level
        )
        .into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Reload the key set on SIGHUP
#[cfg(unix)]
fn spawn_reload_listener(state: Arc<AppState>, config_path: Option<PathBuf>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "SIGHUP handler unavailable, key reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading API keys");

            let reloaded = AppConfig::load(config_path.clone())
                .and_then(|config| config.validate().map(|_| config))
                .map_err(anyhow::Error::from)
                .and_then(|config| state.reload_keys(&config).map_err(anyhow::Error::from));

            match reloaded {
                Ok(count) => tracing::info!(keys = count, "API keys reloaded"),
                Err(e) => tracing::error!(error = %e, "Key reload failed, keeping current keys"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_state: Arc<AppState>, _config_path: Option<PathBuf>) {
    tracing::info!("Key reload on SIGHUP is only available on Unix");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
