//! Gateway routing subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → proxy.rs (/{resource}..., forwarded through the resource's invoker)
//!     → aggregation.rs (/{primary}/{id}/details, concurrent fan-out)
//!     → health.rs (/status, /health with breaker snapshots)
//! ```
//!
//! Every upstream call goes through the pool's invokers, so breaker state is
//! shared between plain forwarding and aggregation.

pub mod aggregation;
pub mod health;
pub mod proxy;

use std::sync::Arc;

use axum::Router;

use crate::config::GatewayConfig;
use crate::upstream::UpstreamPool;

pub use aggregation::Aggregation;
pub use proxy::respond;

/// Assemble the gateway router from the configured upstreams.
pub fn build_router(config: &GatewayConfig, pool: Arc<UpstreamPool>) -> Router {
    let mut router = Router::new();

    for upstream in &config.upstreams {
        if let Some(invoker) = pool.get(&upstream.name) {
            router = router.merge(proxy::resource_routes(invoker, &upstream.extra_routes));
        }
    }

    if let Some(aggregation) = &config.aggregation {
        match (pool.get(&aggregation.primary), pool.get(&aggregation.secondary)) {
            (Some(primary), Some(secondary)) => {
                let fanout = Arc::new(Aggregation::new(primary, secondary, aggregation.clone()));
                router = router.merge(fanout.routes());
            }
            _ => tracing::warn!(
                primary = %aggregation.primary,
                secondary = %aggregation.secondary,
                "Aggregation disabled, upstream not registered"
            ),
        }
    }

    router.merge(health::routes(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{Transport, TransportError, UpstreamRequest, UpstreamResponse};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Records forwarded requests and answers 200 with the path it saw.
    #[derive(Debug, Default)]
    struct Echo {
        seen: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl Transport for Echo {
        async fn send(&self, base: &str, req: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push((base.to_string(), req.path_and_query.clone(), req.request_id.clone()));
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                body: json!({ "path": req.path_and_query, "method": req.method.as_str() }),
            })
        }
    }

    fn app() -> (Router, Arc<Echo>) {
        let echo = Arc::new(Echo::default());
        let config = GatewayConfig::default();
        let pool = Arc::new(UpstreamPool::from_config(&config, echo.clone()));
        (build_router(&config, pool), echo)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_forwards_path_and_query_verbatim() {
        let (router, echo) = app();
        let request = Request::get("/reviews?orderId=3&productId=9")
            .header("x-request-id", "req-1")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "/reviews?orderId=3&productId=9");

        let seen = echo.seen.lock().unwrap();
        assert_eq!(seen[0].0, "http://service_reviews:8000");
        assert_eq!(seen[0].2.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_extra_route_and_methods() {
        let (router, _) = app();
        let (status, body) = send(
            router.clone(),
            Request::get("/reviews/product/12/average").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "/reviews/product/12/average");

        let (status, body) = send(
            router,
            Request::delete("/orders/4").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "DELETE");
    }

    #[tokio::test]
    async fn test_rejects_bad_input_without_calling_upstream() {
        let (router, echo) = app();

        let (status, body) = send(router.clone(), Request::get("/users/abc").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid users id");

        let (status, _) = send(
            router.clone(),
            Request::post("/users")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(router, Request::get("/users/1x/details").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(echo.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_and_status_routes() {
        let (router, _) = app();
        let (status, body) = send(router.clone(), Request::get("/status").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "API Gateway is running"}));

        let (_, body) = send(router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(body["circuits"]["orders"]["status"], "closed");
    }
}
