use anyhow::{Result, Context};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

mod api;
mod config;
mod engine;
mod models;
mod notify;
mod stream;

use crate::config::MonitorConfig;
use crate::engine::Monitor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = "config.json";
    let config_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path))?;
    let mut config: MonitorConfig = serde_json::from_str(&config_content)
        .with_context(|| "Failed to parse config")?;
    config.apply_env();
    config.validate()?;

    let monitor = Arc::new(Monitor::new(config.clone())?);
    let state_for_api = monitor.state.clone();
    let api_port = config.api_port;

    tokio::spawn(async move {
        api::start_server(api_port, state_for_api).await;
    });

    monitor.run()?;

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Closing gatewatch...");

    Ok(())
}
