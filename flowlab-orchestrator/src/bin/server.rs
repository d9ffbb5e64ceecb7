//! FlowLab server binary
//!
//! Usage: flowlab-server [config.toml]

use anyhow::{Context, Result};
use flowlab::api::{create_router, AppState};
use flowlab::{LabConfig, SessionStore};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting FlowLab Server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "flowlab.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        LabConfig::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?
    } else {
        warn!(config_path = config_path, "Config file not found, using defaults");
        LabConfig::default()
    };

    info!(
        config_path = config_path,
        sessions_root = %config.sessions_root.display(),
        template_case = ?config.template_case,
        solver = %config.solver.script.display(),
        "Loaded configuration"
    );

    let sessions = Arc::new(
        SessionStore::new(
            &config.sessions_root,
            config.template_case.clone(),
            Duration::from_secs(config.session_ttl_secs),
        )
        .context("Failed to prepare session store")?,
    );

    // Reap idle sessions in the background
    Arc::clone(&sessions).start_reaper_task(config.reap_interval_secs);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen_addr))?;

    let state = Arc::new(AppState { config, sessions });
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
