//! Per-resource forwarding.
//!
//! # Routes (per upstream `r`)
//! ```text
//! GET    /{r}            GET /{r}/status     GET /{r}/health
//! POST   /{r}
//! GET    /{r}/{id}       PUT /{r}/{id}       DELETE /{r}/{id}
//! GET    <extra_routes>
//! ```
//!
//! The inbound path and query are forwarded unchanged to the upstream's base
//! URL. Identifiers and JSON bodies are checked here so malformed input is
//! answered with 400 without touching the upstream or its breaker.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::http::response::INTERNAL_ERROR_MESSAGE;
use crate::http::{json_error, request_id};
use crate::observability::metrics;
use crate::upstream::{FallbackReason, Invocation, UpstreamInvoker, UpstreamRequest};

/// Routes forwarding to one upstream.
pub fn resource_routes(invoker: Arc<UpstreamInvoker>, extra_routes: &[String]) -> Router {
    let name = invoker.name().to_string();
    let mut router = Router::new()
        .route(&format!("/{}", name), get(forward).post(forward))
        .route(&format!("/{}/status", name), get(forward))
        .route(&format!("/{}/health", name), get(forward))
        .route(
            &format!("/{}/{{id}}", name),
            get(forward_by_id).put(forward_by_id).delete(forward_by_id),
        );

    for route in extra_routes {
        router = router.route(route, get(forward));
    }

    router.with_state(invoker)
}

/// Map an invocation to the client response.
///
/// Upstream answers keep their status. An open breaker is a 503 carrying the
/// fallback payload; a failed or timed-out call is a generic 500.
pub fn respond(invocation: Invocation) -> Response {
    match invocation {
        Invocation::Success { status, body } | Invocation::ApplicationError { status, body } => {
            (status, Json(body)).into_response()
        }
        Invocation::Fallback {
            payload,
            reason: FallbackReason::BreakerOpen,
        } => (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response(),
        Invocation::Fallback { .. } => json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE),
    }
}

async fn forward(
    State(invoker): State<Arc<UpstreamInvoker>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay(&invoker, method, uri, &headers, body).await
}

async fn forward_by_id(
    State(invoker): State<Arc<UpstreamInvoker>>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if id.parse::<u64>().is_err() {
        return json_error(StatusCode::BAD_REQUEST, format!("Invalid {} id", invoker.name()));
    }
    relay(&invoker, method, uri, &headers, body).await
}

async fn relay(invoker: &Arc<UpstreamInvoker>, method: Method, uri: Uri, headers: &HeaderMap, body: Bytes) -> Response {
    let start = Instant::now();
    let method_label = method.to_string();

    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let mut request = UpstreamRequest::new(method, path_and_query).with_request_id(request_id(headers));
    if let Some(payload) = payload {
        request = request.with_body(payload);
    }

    let response = respond(invoker.invoke(request).await);
    metrics::record_request(&method_label, invoker.name(), response.status().as_u16(), start);
    response
}

fn parse_body(body: &Bytes) -> Result<Option<Value>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid JSON body"))
}
