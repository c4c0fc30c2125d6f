use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use gatekeeper::config::{GatekeeperConfig, StoreBackend};
use gatekeeper::grpc::GrpcServer;
use gatekeeper::ratelimit::{PolicyRegistry, RateLimiter};
use gatekeeper::store::{MemoryStore, RedisStore, StoreClient};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", about = "Rate limiting decision service", version)]
struct Args {
    /// Path to a YAML configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Gatekeeper Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let config = match args.config {
        Some(path) => GatekeeperConfig::from_file(&path)?,
        None => GatekeeperConfig::default(),
    };
    info!(grpc_addr = %config.server.grpc_addr, "Configuration loaded");

    // Connect the shared store
    let store: Arc<dyn StoreClient> = match config.store.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store.url).await?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(backend = ?config.store.backend, "Store client connected");

    // Build the policy registry; invalid parameters abort startup here
    let registry = PolicyRegistry::from_config(&config.policies)?;
    info!(policy_count = registry.len(), "Policy registry built");

    let rate_limiter = Arc::new(RateLimiter::new(registry, store));

    // Create and start the gRPC server
    let grpc_server = GrpcServer::new(config.server.grpc_addr, rate_limiter);

    info!("Starting gRPC server on {}", config.server.grpc_addr);

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatekeeper Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
