//! Configuration validation.
//!
//! Serde handles syntax; this pass checks meaning. Validation is a pure
//! function over the parsed config and reports every problem it finds, not
//! just the first one.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{BreakerConfig, GatewayConfig, ListenerConfig, ServiceConfig, ServiceKind};

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a gateway configuration.
pub fn validate_gateway(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_listener(&config.listener, &mut errors);
    check_breaker("breaker", &config.breaker, &mut errors);

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.upstreams.is_empty() {
        errors.push(ValidationError::new("upstreams", "at least one upstream is required"));
    }

    let mut names = HashSet::new();
    for (i, upstream) in config.upstreams.iter().enumerate() {
        let field = format!("upstreams[{}]", i);
        if upstream.name.is_empty() || upstream.name.contains('/') {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                "must be a single non-empty path segment",
            ));
        }
        if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate upstream '{}'", upstream.name),
            ));
        }
        check_url(&format!("{}.base_url", field), &upstream.base_url, &mut errors);
        for route in &upstream.extra_routes {
            if !route.starts_with(&format!("/{}/", upstream.name)) {
                errors.push(ValidationError::new(
                    format!("{}.extra_routes", field),
                    format!("route '{}' must live under /{}/", route, upstream.name),
                ));
            }
        }
        if upstream.application_statuses.iter().any(|s| (200..300).contains(s) || *s < 100 || *s > 599) {
            errors.push(ValidationError::new(
                format!("{}.application_statuses", field),
                "must contain only non-2xx HTTP status codes",
            ));
        }
        if let Some(breaker) = &upstream.breaker {
            check_breaker(&format!("{}.breaker", field), breaker, &mut errors);
        }
    }

    if let Some(aggregation) = &config.aggregation {
        for (key, name) in [("primary", &aggregation.primary), ("secondary", &aggregation.secondary)] {
            if !names.contains(name.as_str()) {
                errors.push(ValidationError::new(
                    format!("aggregation.{}", key),
                    format!("references unknown upstream '{}'", name),
                ));
            }
        }
        if aggregation.primary == aggregation.secondary {
            errors.push(ValidationError::new("aggregation", "primary and secondary must differ"));
        }
        if aggregation.foreign_key.is_empty() {
            errors.push(ValidationError::new("aggregation.foreign_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a backing service configuration.
pub fn validate_service(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_listener(&config.listener, &mut errors);

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    let cache = &config.cache;
    for (field, ttl) in [
        ("cache.entity_ttl_secs", cache.entity_ttl_secs),
        ("cache.collection_ttl_secs", cache.collection_ttl_secs),
        ("cache.aggregate_ttl_secs", cache.aggregate_ttl_secs),
    ] {
        // A zero TTL would leave invalidation as the only bound on staleness.
        if ttl == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if config.kind == ServiceKind::Reviews {
        check_url("dependencies.orders_url", &config.dependencies.orders_url, &mut errors);
        check_breaker("dependencies.breaker", &config.dependencies.breaker, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_listener(listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", listener.bind_address),
        ));
    }
}

fn check_url(field: &str, raw: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "http" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_breaker(prefix: &str, breaker: &BreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.call_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{}.call_timeout_ms", prefix), "must be > 0"));
    }
    if !(0.0..=100.0).contains(&breaker.error_threshold_percentage) {
        errors.push(ValidationError::new(
            format!("{}.error_threshold_percentage", prefix),
            "must be within 0..=100",
        ));
    }
    if breaker.rolling_buckets == 0 {
        errors.push(ValidationError::new(format!("{}.rolling_buckets", prefix), "must be > 0"));
    }
    if breaker.rolling_window_ms < breaker.rolling_buckets as u64 {
        errors.push(ValidationError::new(
            format!("{}.rolling_window_ms", prefix),
            "must be at least one millisecond per bucket",
        ));
    }
    if breaker.half_open_max_calls == 0 {
        errors.push(ValidationError::new(
            format!("{}.half_open_max_calls", prefix),
            "must admit at least one trial call",
        ));
    }
}
