//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::{CacheBackend, GatewayConfig, ServiceConfig};
use crate::config::validation::{validate_gateway, validate_service, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate gateway configuration from a TOML file.
///
/// A missing path yields the defaults. Environment overrides are applied
/// before validation.
pub fn load_gateway_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_toml(path)?,
        None => GatewayConfig::default(),
    };

    if let Some(addr) = port_override() {
        config.listener.bind_address = addr;
    }

    validate_gateway(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate backing service configuration from a TOML file.
pub fn load_service_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_toml(path)?,
        None => ServiceConfig::default(),
    };

    if let Some(addr) = port_override() {
        config.listener.bind_address = addr;
    }
    if let Ok(host) = std::env::var("REDIS_HOST") {
        let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
        config.cache.backend = CacheBackend::Redis;
        config.cache.redis_url = format!("redis://{}:{}", host, port);
    }
    if let Ok(url) = std::env::var("ORDERS_SERVICE_URL") {
        config.dependencies.orders_url = url;
    }

    validate_service(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// `PORT` rebinds the listener on all interfaces.
fn port_override() -> Option<String> {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .map(|port| format!("0.0.0.0:{}", port))
}
