//! fleetsim - simulated server fleet with a read-only HTTP API.

mod config;
mod fleet;
mod scheduler;
mod web;

use config::SimConfig;
use fleet::FleetStore;
use scheduler::Scheduler;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("fleetsim=info".parse()?))
        .init();

    // Load configuration
    let cfg = SimConfig::load();
    tracing::info!("Starting fleetsim on port {}...", cfg.http_port);

    // Generate the fleet; bad configuration aborts here
    let store = Arc::new(FleetStore::new(&cfg)?);

    // Start ticking
    let scheduler = Scheduler::new(store.clone(), cfg.tick_interval(), cfg.error_backoff());
    scheduler.start().await;

    // Serve until Ctrl-C
    let server = Server::new(cfg, store);
    let result = server.start(shutdown_signal()).await;

    scheduler.stop().await;
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
