//! Request identification.
//!
//! Every inbound request carries an `x-request-id`: the caller's if present,
//! otherwise a fresh UUID v4 set by `SetRequestIdLayer`. Handlers read it back
//! to tag logs and forward it to upstreams.

use axum::http::{HeaderMap, HeaderName};

/// Correlation header name.
pub const X_REQUEST_ID: &str = "x-request-id";

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_REQUEST_ID)
}

/// The request's correlation id, if it is valid header text.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
