//! Backing service process (users, orders or reviews).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resilient_gateway::cache;
use resilient_gateway::config::{load_service_config, ServiceKind};
use resilient_gateway::lifecycle::{shutdown_on_signal, Shutdown};
use resilient_gateway::observability::{init_logging, metrics};
use resilient_gateway::services;
use resilient_gateway::storage::MemoryStore;
use resilient_gateway::upstream::HyperTransport;
use resilient_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "service")]
#[command(about = "Cache-aside backing service", long_about = None)]
struct Args {
    /// Service to run; overrides `kind` from the config file.
    #[arg(short, long)]
    kind: Option<ServiceKind>,

    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_service_config(args.config.as_deref())?;
    if let Some(kind) = args.kind {
        config.kind = kind;
    }

    init_logging(&config.observability);
    tracing::info!(
        service = %config.kind,
        bind_address = %config.listener.bind_address,
        cache = ?config.cache.backend,
        "service starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let kv = cache::connect(&config.cache).await?;
    let store = Arc::new(MemoryStore::new());
    let router = services::build_router(&config, store, kv, Arc::new(HyperTransport::new()));
    let server = HttpServer::new(router, config.timeouts.request_timeout());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown_on_signal(shutdown);

    server.run(listener, receiver).await?;

    tracing::info!(service = %config.kind, "Shutdown complete");
    Ok(())
}
