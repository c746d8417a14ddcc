//! Gateway status and health endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::resilience::{CircuitState, WindowCounts};
use crate::upstream::UpstreamPool;

pub const GATEWAY_STATUS: &str = "API Gateway is running";

#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub status: &'static str,
}

/// Per-upstream breaker view reported by `/health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitReport {
    pub status: CircuitState,
    pub stats: WindowCounts,
    pub failure_percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub status: &'static str,
    pub circuits: BTreeMap<String, CircuitReport>,
}

pub fn routes(pool: Arc<UpstreamPool>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/health", get(get_health))
        .with_state(pool)
}

pub async fn get_status() -> Json<GatewayStatus> {
    Json(GatewayStatus {
        status: GATEWAY_STATUS,
    })
}

pub async fn get_health(State(pool): State<Arc<UpstreamPool>>) -> Json<GatewayHealth> {
    let circuits = pool
        .snapshots()
        .into_iter()
        .map(|(name, snapshot)| {
            let report = CircuitReport {
                status: snapshot.state,
                stats: snapshot.stats,
                failure_percentage: snapshot.failure_percentage,
            };
            (name, report)
        })
        .collect();

    Json(GatewayHealth {
        status: GATEWAY_STATUS,
        circuits,
    })
}
