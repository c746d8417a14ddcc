//! Transport seam for upstream calls.
//!
//! The invoker only needs "send this request, give me status and JSON body".
//! [`HyperTransport`] does that over a pooled `hyper-util` client; tests plug
//! in their own [`Transport`].

use std::fmt;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use thiserror::Error;

use crate::http::X_REQUEST_ID;

/// Largest upstream body the gateway will buffer.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// One request to an upstream, relative to its base URL.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path plus optional query, e.g. `/orders?userId=3`.
    pub path_and_query: String,
    pub body: Option<Value>,
    pub request_id: Option<String>,
}

impl UpstreamRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            body: None,
            request_id: None,
        }
    }

    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self::new(Method::GET, path_and_query)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Status and decoded body as returned by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// JSON body; non-JSON text becomes a string, an empty body `null`.
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid upstream URI '{0}'")]
    InvalidUri(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("failed to read upstream body: {0}")]
    Body(String),
}

/// Sends one request to an upstream base URL.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, base_url: &str, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// Production transport over the pooled legacy hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, base_url: &str, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let target = format!("{}{}", base_url.trim_end_matches('/'), request.path_and_query);
        let uri: Uri = target.parse().map_err(|_| TransportError::InvalidUri(target.clone()))?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(id) = request.request_id.as_deref().and_then(|id| HeaderValue::from_str(id).ok()) {
            builder = builder.header(X_REQUEST_ID, id);
        }

        let body = match &request.body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                let bytes = serde_json::to_vec(value).map_err(|e| TransportError::Encode(e.to_string()))?;
                Body::from(bytes)
            }
            None => Body::empty(),
        };
        let outbound = builder.body(body).map_err(|e| TransportError::Encode(e.to_string()))?;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"id":1}"#), json!({"id": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        // Port 1 on loopback is never listening in CI sandboxes.
        let transport = HyperTransport::new();
        let err = transport
            .send("http://127.0.0.1:1", &UpstreamRequest::get("/users"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let transport = HyperTransport::new();
        let err = transport
            .send("not a url", &UpstreamRequest::get("/users"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri(_)));
    }
}
