//! Shared utilities for integration tests.
//!
//! Everything binds `127.0.0.1:0`, so tests run in parallel without port
//! bookkeeping.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use resilient_gateway::cache::MemoryCache;
use resilient_gateway::config::{BreakerConfig, GatewayConfig, ServiceConfig, ServiceKind, UpstreamConfig};
use resilient_gateway::gateway;
use resilient_gateway::lifecycle::Shutdown;
use resilient_gateway::services;
use resilient_gateway::storage::MemoryStore;
use resilient_gateway::upstream::{HyperTransport, UpstreamPool};
use resilient_gateway::HttpServer;

/// Head of a request seen by a mock backend.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
}

/// Start a programmable mock backend; `f` maps each request to (status, JSON body).
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(SeenRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        serve_one(socket, f).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn serve_one<F, Fut>(mut socket: TcpStream, f: Arc<F>)
where
    F: Fn(SeenRequest) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let Some(seen) = read_head(&mut socket).await else {
        return;
    };

    let (status, body) = f(seen).await;
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read up to the end of the request head; the body is ignored.
async fn read_head(socket: &mut TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let mut parts = head.lines().next()?.split_whitespace();
    Some(SeenRequest {
        method: parts.next()?.to_string(),
        target: parts.next()?.to_string(),
    })
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn upstream(name: &str, label: &str, addr: SocketAddr) -> UpstreamConfig {
    UpstreamConfig::new(name, label, &format!("http://{}", addr))
}

/// Fast-cycling breaker for tests.
pub fn quick_breaker() -> BreakerConfig {
    BreakerConfig {
        call_timeout_ms: 300,
        reset_timeout_ms: 400,
        ..BreakerConfig::default()
    }
}

/// Gateway config over the given upstreams, with the default aggregation.
pub fn gateway_config(upstreams: Vec<UpstreamConfig>) -> GatewayConfig {
    GatewayConfig {
        upstreams,
        breaker: quick_breaker(),
        ..GatewayConfig::default()
    }
}

/// Run a gateway in-process; returns its address and the shutdown handle.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let pool = Arc::new(UpstreamPool::from_config(&config, Arc::new(HyperTransport::new())));
    let router = gateway::build_router(&config, pool);
    serve(HttpServer::new(router, config.timeouts.request_timeout())).await
}

/// Run one backing service in-process with an in-memory store and cache.
pub async fn start_service(kind: ServiceKind, orders: Option<SocketAddr>) -> (SocketAddr, Shutdown) {
    let mut config = ServiceConfig {
        kind,
        ..ServiceConfig::default()
    };
    if let Some(orders) = orders {
        config.dependencies.orders_url = format!("http://{}", orders);
    }
    config.dependencies.breaker = quick_breaker();

    let router = services::build_router(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCache::new()),
        Arc::new(HyperTransport::new()),
    );
    serve(HttpServer::new(router, config.timeouts.request_timeout())).await
}

async fn serve(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
