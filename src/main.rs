//! Resilient API gateway.
//!
//! ```text
//!     Client ──▶ http server ──▶ gateway router ──┬─▶ proxy ───────┐
//!                (request id,                     ├─▶ aggregation ─┤
//!                 trace, timeout)                 └─▶ health       │
//!                                                                  ▼
//!                                     upstream invoker (breaker + fallback)
//!                                                                  │
//!                                                                  ▼
//!                                          users / orders / reviews services
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resilient_gateway::config::load_gateway_config;
use resilient_gateway::gateway;
use resilient_gateway::lifecycle::{shutdown_on_signal, Shutdown};
use resilient_gateway::observability::{init_logging, metrics};
use resilient_gateway::upstream::{HyperTransport, UpstreamPool};
use resilient_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "Resilient API gateway", long_about = None)]
struct Args {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var_os("GATEWAY_CONFIG").map(PathBuf::from));
    let config = load_gateway_config(config_path.as_deref())?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstreams = config.upstreams.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
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

    let pool = Arc::new(UpstreamPool::from_config(&config, Arc::new(HyperTransport::new())));
    let router = gateway::build_router(&config, pool);
    let server = HttpServer::new(router, config.timeouts.request_timeout());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown_on_signal(shutdown);

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
