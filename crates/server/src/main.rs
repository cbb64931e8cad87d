mod bootstrap;
mod health;
pub mod routes;

use std::sync::Arc;

use anyhow::Result;
use tably_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tably_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = routes::router(routes::AppState {
        runtime: Arc::clone(&app.runtime),
        carts: Arc::clone(&app.carts),
    })
    .merge(health::router(app.db_pool.clone()));

    let bind = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %bind,
        "tably-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tably-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            "failed to install ctrl-c handler"
        );
    }
}
