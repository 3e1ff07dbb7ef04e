use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod app;
mod backend;
mod composite;
mod config;
mod error;
mod events;
mod integration;
mod messaging;
mod metrics;
mod models;
mod utils;

use config::AppConfig;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,university_composite=debug")),
        )
        .init();

    tracing::info!("🚀 Starting university composite service");

    let config = AppConfig::from_env()?;
    tracing::info!(
        role = ?config.role,
        bus = ?config.bus,
        organization_url = %config.organization_url,
        member_url = %config.member_url,
        "Configuration loaded"
    );

    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let running = app::build(&config, metrics)?;
    tracing::info!(ports = ?running.ports, "✅ Servers bound");

    futures_util::future::try_join_all(running.servers).await?;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}
