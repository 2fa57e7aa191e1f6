use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podbridge::config::AppConfig;
use podbridge::gateway::Gateway;
use podbridge::pods::inventory::{spawn_refresh_task, HttpInventorySource};
use podbridge::pods::PodLocator;
use podbridge::session::{ProbeSet, SessionRegistry};
use podbridge::ssh::RusshTransportFactory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::parse();

    let locator = Arc::new(PodLocator::new(config.ssh_username.clone()));
    if let Some(url) = &config.inventory_url {
        let source = Arc::new(HttpInventorySource::new(url));
        spawn_refresh_task(Arc::clone(&locator), source, config.refresh_interval());
        info!("Inventory refresh every {}s from {}", config.refresh_secs, url);
    } else {
        info!("No inventory URL configured; starting with an empty snapshot");
    }

    let factory = Arc::new(RusshTransportFactory::new(config.ssh_config()));
    let registry = SessionRegistry::new(factory, ProbeSet::default(), config.session_settings());

    let listener = TcpListener::bind(config.bind).await?;
    info!("Gateway listening on {}", config.bind);

    let gateway = Gateway::new(Arc::clone(&registry), locator);
    let serve = tokio::spawn(gateway.serve(listener));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, closing sessions");
    serve.abort();
    registry.shutdown().await;

    Ok(())
}
