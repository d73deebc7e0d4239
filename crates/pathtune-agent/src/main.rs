//! pathtune agent - Main Entry Point

use pathtune_agent::{DryRunApplier, PingTransport};
use pathtune_core::{Catalog, EngineConfig, Optimizer};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("pathtune agent v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::var("PATHTUNE_CONFIG")
        .unwrap_or_else(|_| "/etc/pathtune/config.json".into());

    let config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!(path = %config_path, error = %e, "Config not loaded, using defaults");
        EngineConfig::default()
    });

    let catalog = match &config.qos.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    };

    let optimizer = Optimizer::new(config, Arc::new(PingTransport::new()), Arc::new(catalog))?;
    optimizer.run_and_apply(&DryRunApplier::new()).await?;

    Ok(())
}
