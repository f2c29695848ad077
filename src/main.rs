//! Demo binary: registers this process under a service name, resolves a
//! peer service, and serves picks until signaled to stop.
//!
//! Wiring and shutdown handling mirror `ZVault`-style bootstrap
//! (structured-logging init, `wait_for_close` on SIGINT/SIGTERM) adapted
//! from the pattern in `other_examples` referenced in DESIGN.md.

use std::env;

use meshreg::config::DiscoveryConfig;
use meshreg::context::context_with_standard;
use meshreg::descriptor::ServiceDescriptor;
use meshreg::subscription::DependencyMode;
use meshreg::{wait_for_close, Discovery};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = DiscoveryConfig::from_env();
    info!(endpoints = ?config.endpoints, environment = %config.environment, "discovery starting");

    let discovery = Discovery::init(config).await?;

    let service_name = env::var("SERVICE_NAME").unwrap_or_else(|_| "demo".to_string());
    let listen_host = env::var("SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let (_listener, address) = meshreg::net_util::pick_local_addr(&listen_host)?;

    discovery
        .register(ServiceDescriptor::new(service_name.clone(), address.clone()))
        .await;
    info!(address = %address, name = %service_name, "registered");

    if let Ok(peer_name) = env::var("DEPENDS_ON") {
        let resolved = discovery.resolve(&peer_name, DependencyMode::Normal).await?;
        let pick = resolved.pick(&context_with_standard());
        info!(peer = %peer_name, ?pick, "initial pick against dependency");
    }

    wait_for_close(&discovery).await;
    info!("shut down cleanly");
    Ok(())
}
