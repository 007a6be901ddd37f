//! # LB Provisioner - Main Entry Point
//!
//! Loads the configuration, initializes logging and metrics, wires the DNS resolver, address
//! allocator and load balancer client together, and serves the HTTP API until SIGINT or
//! SIGTERM.

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use lb_provisioner::observability::{init_logging, init_metrics};
use lb_provisioner::{ProvisionerConfig, ProvisionerResult, ProvisionerServer, ProvisioningService};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Failed to start provisioner: {}", e);
        eprintln!("lb-provisioner: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ProvisionerResult<()> {
    let config = ProvisionerConfig::load().await?;

    init_logging(&config.observability.logging);
    info!("🚀 Starting LB Provisioner");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let metrics = init_metrics(&config.observability.metrics)?;
    if metrics.is_some() {
        info!(
            path = %config.observability.metrics.endpoint_path,
            "📈 Prometheus metrics enabled"
        );
    }

    let service = Arc::new(ProvisioningService::from_config(&config)?);
    let server = ProvisionerServer::new(&config, service, metrics);

    server.start(shutdown_signal()).await?;

    info!("✅ LB Provisioner shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT, initiating graceful shutdown..."),
        _ = terminate => info!("📡 Received SIGTERM, initiating graceful shutdown..."),
    }
}
