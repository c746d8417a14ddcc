//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by route, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency
//! - `gateway_upstream_calls_total` (counter): upstream calls by upstream, outcome
//! - `gateway_upstream_call_duration_seconds` (histogram): upstream latency
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_breaker_transitions_total` (counter): transitions by target state
//! - `service_cache_lookups_total` (counter): cache lookups by result
//! - `service_cache_invalidations_total` (counter): deleted keys by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exposition is opt-in via `observability.metrics_enabled`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one inbound request.
pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record one upstream invocation and its outcome
/// (`success`, `application_error`, `fallback`).
pub fn record_upstream_call(upstream: &str, outcome: &'static str, start: Instant) {
    counter!(
        "gateway_upstream_calls_total",
        "upstream" => upstream.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        "gateway_upstream_call_duration_seconds",
        "upstream" => upstream.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Set the breaker state gauge without counting a transition.
pub fn set_breaker_state(upstream: &str, state: CircuitState) {
    let level = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_breaker_state", "upstream" => upstream.to_string()).set(level);
}

/// Record a breaker moving into `state`.
pub fn record_breaker_transition(upstream: &str, state: CircuitState) {
    set_breaker_state(upstream, state);
    counter!(
        "gateway_breaker_transitions_total",
        "upstream" => upstream.to_string(),
        "to" => state.as_str()
    )
    .increment(1);
}

/// Record a cache lookup (`hit`, `miss`, `error`).
pub fn record_cache_lookup(service: &str, result: &'static str) {
    counter!(
        "service_cache_lookups_total",
        "service" => service.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record keys removed by invalidation (`key` or `prefix`).
pub fn record_cache_invalidation(service: &str, kind: &'static str, removed: usize) {
    counter!(
        "service_cache_invalidations_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(removed as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

    use crate::config::BreakerConfig;
    use crate::resilience::CircuitBreaker;

    /// Captures the breaker gauge and transition counter; drops the rest.
    struct BreakerRecorder {
        state: Arc<AtomicU64>,
        transitions: Arc<AtomicU64>,
    }

    impl Recorder for BreakerRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            match key.name() {
                "gateway_breaker_transitions_total" => Counter::from_arc(self.transitions.clone()),
                _ => Counter::noop(),
            }
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            match key.name() {
                "gateway_breaker_state" => Gauge::from_arc(self.state.clone()),
                _ => Gauge::noop(),
            }
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_new_breaker_sets_gauge_without_transition() {
        let recorder = BreakerRecorder {
            state: Arc::new(AtomicU64::new(f64::to_bits(-1.0))),
            transitions: Arc::new(AtomicU64::new(0)),
        };
        let gauge = |r: &BreakerRecorder| f64::from_bits(r.state.load(Ordering::SeqCst));

        metrics::with_local_recorder(&recorder, || {
            let _breaker = CircuitBreaker::new("users", BreakerConfig::default());
        });
        assert_eq!(gauge(&recorder), 0.0);
        assert_eq!(recorder.transitions.load(Ordering::SeqCst), 0);

        metrics::with_local_recorder(&recorder, || record_breaker_transition("users", CircuitState::Open));
        assert_eq!(gauge(&recorder), 2.0);
        assert_eq!(recorder.transitions.load(Ordering::SeqCst), 1);
    }
}
