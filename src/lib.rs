//! Resilient API gateway and cache-aside backing services.

pub mod cache;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod storage;
pub mod upstream;

pub use config::{GatewayConfig, ServiceConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::CircuitBreaker;
pub use upstream::{UpstreamInvoker, UpstreamPool};
