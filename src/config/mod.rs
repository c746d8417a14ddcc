//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig / ServiceConfig (validated, immutable)
//!     → cloned into the subsystems that need it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_gateway_config, load_service_config, ConfigError};
pub use schema::{
    AggregationConfig, BreakerConfig, CacheBackend, CacheConfig, DependencyConfig, GatewayConfig,
    ListenerConfig, ObservabilityConfig, ServiceConfig, ServiceKind, TimeoutConfig, UpstreamConfig,
};
