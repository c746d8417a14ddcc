//! Configuration schema definitions.
//!
//! Two roots live here: [`GatewayConfig`] for the gateway process and
//! [`ServiceConfig`] for a backing service process. All types derive Serde
//! traits for deserialization from TOML and fall back to defaults that match
//! the reference deployment (docker-compose service names, port 8000).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Inbound request deadline.
    pub timeouts: TimeoutConfig,

    /// Breaker settings applied to every upstream without its own override.
    pub breaker: BreakerConfig,

    /// Upstream services exposed through the gateway.
    pub upstreams: Vec<UpstreamConfig>,

    /// Fan-out/fan-in endpoint (`GET /{primary}/{id}/details`).
    pub aggregation: Option<AggregationConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            breaker: BreakerConfig::default(),
            upstreams: vec![
                UpstreamConfig::new("users", "Users", "http://service_users:8000"),
                UpstreamConfig::new("orders", "Orders", "http://service_orders:8000"),
                UpstreamConfig {
                    extra_routes: vec!["/reviews/product/{productId}/average".to_string()],
                    ..UpstreamConfig::new("reviews", "Reviews", "http://service_reviews:8000")
                },
            ],
            aggregation: Some(AggregationConfig::default()),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Breaker settings in effect for the given upstream.
    pub fn breaker_for(&self, upstream: &UpstreamConfig) -> BreakerConfig {
        upstream.breaker.clone().unwrap_or_else(|| self.breaker.clone())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Circuit breaker tuning for one upstream dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Upper bound for a single upstream call, in milliseconds.
    pub call_timeout_ms: u64,

    /// Failure percentage within the rolling window that opens the breaker.
    pub error_threshold_percentage: f64,

    /// How long the breaker stays open before admitting a trial call.
    pub reset_timeout_ms: u64,

    /// Length of the rolling observation window, in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_buckets: u32,

    /// Minimum counted calls in the window before the threshold is evaluated.
    pub volume_threshold: u64,

    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 3000,
            error_threshold_percentage: 50.0,
            reset_timeout_ms: 3000,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
            volume_threshold: 0,
            half_open_max_calls: 1,
        }
    }
}

impl BreakerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }
}

/// One upstream service reachable through the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Resource name; also the first path segment (`/users`, `/orders`).
    pub name: String,

    /// Human label used in fallback messages ("Users service temporarily unavailable").
    pub label: String,

    /// Base URL of the upstream (e.g., "http://service_users:8000").
    pub base_url: String,

    /// Additional GET routes forwarded verbatim (axum path syntax).
    #[serde(default)]
    pub extra_routes: Vec<String>,

    /// Non-2xx statuses that are domain outcomes rather than faults.
    #[serde(default = "default_application_statuses")]
    pub application_statuses: Vec<u16>,

    /// Per-upstream breaker override.
    #[serde(default)]
    pub breaker: Option<BreakerConfig>,
}

impl UpstreamConfig {
    pub fn new(name: &str, label: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            base_url: base_url.to_string(),
            extra_routes: Vec::new(),
            application_statuses: default_application_statuses(),
            breaker: None,
        }
    }
}

fn default_application_statuses() -> Vec<u16> {
    vec![400, 404, 409]
}

/// Fan-out/fan-in endpoint definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Upstream that owns the identity (gates the whole response).
    pub primary: String,

    /// Upstream whose collection enriches the primary.
    pub secondary: String,

    /// Composite field holding the primary entity.
    pub primary_field: String,

    /// Composite field holding the filtered secondary collection.
    pub secondary_field: String,

    /// Field on secondary items referencing the primary identifier.
    pub foreign_key: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            primary: "users".to_string(),
            secondary: "orders".to_string(),
            primary_field: "user".to_string(),
            secondary_field: "orders".to_string(),
            foreign_key: "userId".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Root configuration for a backing service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Which service this process runs.
    pub kind: ServiceKind,

    pub listener: ListenerConfig,

    pub timeouts: TimeoutConfig,

    /// Cache backend and TTLs.
    pub cache: CacheConfig,

    /// Other services this one reads from.
    pub dependencies: DependencyConfig,

    pub observability: ObservabilityConfig,
}

/// The three backing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Users,
    Orders,
    Reviews,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Users => "users",
            ServiceKind::Orders => "orders",
            ServiceKind::Reviews => "reviews",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "users" => Ok(ServiceKind::Users),
            "orders" => Ok(ServiceKind::Orders),
            "reviews" => Ok(ServiceKind::Reviews),
            other => Err(format!("unknown service kind '{}'", other)),
        }
    }
}

/// Cache settings for a backing service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Redis connection URL (used when `backend = "redis"`).
    pub redis_url: String,

    /// TTL for single-entity keys, in seconds.
    pub entity_ttl_secs: u64,

    /// TTL for full and filtered collection keys, in seconds.
    pub collection_ttl_secs: u64,

    /// TTL for derived aggregates (review averages), in seconds.
    pub aggregate_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            entity_ttl_secs: 60,
            collection_ttl_secs: 30,
            aggregate_ttl_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn entity_ttl(&self) -> Duration {
        Duration::from_secs(self.entity_ttl_secs)
    }

    pub fn collection_ttl(&self) -> Duration {
        Duration::from_secs(self.collection_ttl_secs)
    }

    pub fn aggregate_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregate_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Upstream dependencies of a backing service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Orders service base URL (reviews validates orders through it).
    pub orders_url: String,

    /// Breaker guarding calls to the orders service.
    pub breaker: BreakerConfig,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            orders_url: "http://service_orders:8000".to_string(),
            breaker: BreakerConfig::default(),
        }
    }
}
