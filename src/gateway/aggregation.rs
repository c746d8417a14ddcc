//! Fan-out/fan-in endpoint: `GET /{primary}/{id}/details`.
//!
//! Both upstream calls start together and the join waits for both, so the
//! latency is that of the slower call. The primary identity gates the whole
//! response; the secondary collection is enrichment only.
//!
//! ```text
//! primary success   + secondary success   → {primary, secondary: filtered}
//! primary success   + secondary fallback  → {primary, secondary: [], secondaryError}
//! primary not found + anything            → primary's 404 (secondary discarded)
//! primary fallback  + anything            → unavailability response
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value};

use crate::config::AggregationConfig;
use crate::gateway::proxy::respond;
use crate::http::{json_error, request_id};
use crate::observability::metrics;
use crate::upstream::{Invocation, UpstreamInvoker, UpstreamRequest};

/// Primary and secondary upstreams plus the composite layout.
pub struct Aggregation {
    primary: Arc<UpstreamInvoker>,
    secondary: Arc<UpstreamInvoker>,
    config: AggregationConfig,
}

impl Aggregation {
    pub fn new(primary: Arc<UpstreamInvoker>, secondary: Arc<UpstreamInvoker>, config: AggregationConfig) -> Self {
        Self {
            primary,
            secondary,
            config,
        }
    }

    pub fn routes(self: Arc<Self>) -> Router {
        let path = format!("/{}/{{id}}/details", self.primary.name());
        Router::new().route(&path, get(details)).with_state(self)
    }

    /// Run both calls concurrently and join them.
    pub async fn fetch(&self, id: u64, request_id: Option<String>) -> Response {
        let primary_request =
            UpstreamRequest::get(format!("/{}/{}", self.primary.name(), id)).with_request_id(request_id.clone());
        let secondary_request = UpstreamRequest::get(format!("/{}", self.secondary.name())).with_request_id(request_id);

        let (primary, secondary) = tokio::join!(
            self.primary.invoke(primary_request),
            self.secondary.invoke(secondary_request),
        );

        let entity = match primary {
            Invocation::Success { body, .. } => body,
            other => {
                if other.is_not_found() {
                    tracing::debug!(primary = self.primary.name(), id, "Aggregation primary not found");
                }
                return respond(other);
            }
        };

        let mut composite = Map::new();
        composite.insert(self.config.primary_field.clone(), entity);

        match secondary {
            Invocation::Success { body, .. } => {
                composite.insert(self.config.secondary_field.clone(), Value::Array(self.owned_by(body, id)));
            }
            Invocation::ApplicationError { status, .. } => {
                tracing::debug!(
                    secondary = self.secondary.name(),
                    status = status.as_u16(),
                    "Aggregation secondary returned application error"
                );
                composite.insert(self.config.secondary_field.clone(), Value::Array(Vec::new()));
            }
            fallback @ Invocation::Fallback { .. } => {
                let message = fallback
                    .fallback_message()
                    .unwrap_or("service temporarily unavailable")
                    .to_string();
                tracing::warn!(secondary = self.secondary.name(), id, "Aggregation served without secondary");
                composite.insert(self.config.secondary_field.clone(), Value::Array(Vec::new()));
                composite.insert(format!("{}Error", self.config.secondary_field), Value::String(message));
            }
        }

        (StatusCode::OK, Json(Value::Object(composite))).into_response()
    }

    /// Items of the secondary collection whose foreign key equals `id`.
    fn owned_by(&self, collection: Value, id: u64) -> Vec<Value> {
        match collection {
            Value::Array(items) => items
                .into_iter()
                .filter(|item| item.get(&self.config.foreign_key).is_some_and(|v| same_id(v, id)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Loose id equality: `3`, `3.0` and `"3"` all equal 3.
fn same_id(value: &Value, id: u64) -> bool {
    match value {
        Value::Number(n) => n.as_u64() == Some(id) || n.as_f64() == Some(id as f64),
        Value::String(s) => s.trim().parse::<u64>().ok() == Some(id),
        _ => false,
    }
}

async fn details(State(aggregation): State<Arc<Aggregation>>, Path(raw): Path<String>, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let Ok(id) = raw.parse::<u64>() else {
        return json_error(StatusCode::BAD_REQUEST, format!("Invalid {} id", aggregation.primary.name()));
    };

    let response = aggregation.fetch(id, request_id(&headers)).await;
    metrics::record_request("GET", "details", response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerConfig, UpstreamConfig};
    use crate::upstream::{Transport, TransportError, UpstreamResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Answers by path after `delay`; `None` means connection failure.
    #[derive(Debug)]
    struct Canned {
        delay: Duration,
        answer: Option<(u16, Value)>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, _base: &str, _req: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Some((status, body)) => Ok(UpstreamResponse {
                    status: StatusCode::from_u16(*status).unwrap(),
                    body: body.clone(),
                }),
                None => Err(TransportError::Request("connection refused".into())),
            }
        }
    }

    fn invoker(name: &str, label: &str, delay_ms: u64, answer: Option<(u16, Value)>) -> Arc<UpstreamInvoker> {
        let transport = Arc::new(Canned {
            delay: Duration::from_millis(delay_ms),
            answer,
        });
        let upstream = UpstreamConfig::new(name, label, "http://upstream.test");
        Arc::new(UpstreamInvoker::new(&upstream, BreakerConfig::default(), transport))
    }

    fn orders() -> Value {
        json!([
            {"id": 1, "userId": 7},
            {"id": 2, "userId": "7"},
            {"id": 3, "userId": 8},
            {"id": 4}
        ])
    }

    async fn body_of(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_composite_filters_secondary_by_id() {
        let agg = Aggregation::new(
            invoker("users", "Users", 0, Some((200, json!({"id": 7, "name": "Ann"})))),
            invoker("orders", "Orders", 0, Some((200, orders()))),
            AggregationConfig::default(),
        );

        let response = agg.fetch(7, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body["user"]["name"], "Ann");
        let ids: Vec<_> = body["orders"].as_array().unwrap().iter().map(|o| o["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);
        assert!(body.get("ordersError").is_none());
    }

    #[tokio::test]
    async fn test_primary_not_found_discards_secondary() {
        let agg = Aggregation::new(
            invoker("users", "Users", 0, Some((404, json!({"error": "User not found"})))),
            invoker("orders", "Orders", 0, Some((200, orders()))),
            AggregationConfig::default(),
        );

        let response = agg.fetch(7, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, json!({"error": "User not found"}));
    }

    #[tokio::test]
    async fn test_secondary_outage_marks_partial_result() {
        let agg = Aggregation::new(
            invoker("users", "Users", 0, Some((200, json!({"id": 7})))),
            invoker("orders", "Orders", 0, None),
            AggregationConfig::default(),
        );

        let response = agg.fetch(7, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body["orders"], json!([]));
        assert_eq!(body["ordersError"], "Orders service temporarily unavailable");
    }

    #[tokio::test]
    async fn test_primary_outage_is_unavailable() {
        let agg = Aggregation::new(
            invoker("users", "Users", 0, None),
            invoker("orders", "Orders", 0, Some((200, orders()))),
            AggregationConfig::default(),
        );

        // Breaker closed when the call failed: generic 500.
        assert_eq!(agg.fetch(7, None).await.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Breaker now open: 503 with the fallback payload.
        let response = agg.fetch(7, None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(response).await["error"], "Users service temporarily unavailable");
    }

    #[tokio::test]
    async fn test_calls_run_concurrently() {
        let agg = Aggregation::new(
            invoker("users", "Users", 200, Some((200, json!({"id": 7})))),
            invoker("orders", "Orders", 200, Some((200, orders()))),
            AggregationConfig::default(),
        );

        let start = Instant::now();
        let response = agg.fetch(7, None).await;
        let elapsed = start.elapsed();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(elapsed < Duration::from_millis(350), "took {:?}, expected about max(200, 200)", elapsed);
    }

    #[test]
    fn test_same_id() {
        assert!(same_id(&json!(3), 3));
        assert!(same_id(&json!(3.0), 3));
        assert!(same_id(&json!("3"), 3));
        assert!(!same_id(&json!("03x"), 3));
        assert!(!same_id(&json!(null), 3));
    }
}
