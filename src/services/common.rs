//! Pieces shared by the backing services.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::http::json_error;
use crate::storage::StoreError;

/// Errors a service handler can answer with.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A dependency answered badly or not at all.
    #[error("{0}")]
    BadGateway(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "Store operation failed");
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
            }
        };
        json_error(status, self.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// `GET /{r}/status`
pub fn status_body(label: &str) -> Json<Value> {
    Json(json!({ "status": format!("{} service is running", label) }))
}

/// `GET /{r}/health`
pub fn health_body(label: &str) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": format!("{} Service", label),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Parse a path identifier; anything but a non-negative integer is a 400.
pub fn parse_id(raw: &str, name: &str) -> ServiceResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ServiceError::bad_request(format!("Invalid {}", name)))
}

/// Request body as a JSON object. An empty body is an empty object.
pub fn parse_object(body: &Bytes) -> ServiceResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::bad_request("Request body must be a JSON object")),
        Err(_) => Err(ServiceError::bad_request("Invalid JSON body")),
    }
}

/// Integer value of a JSON number or numeric string.
///
/// Floats count only when they have no fractional part (`3.0`).
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Integer query parameter; absent or empty is `None`.
///
/// Only an optional sign and decimal digits are accepted, so `5.0` and
/// `1e0` are rejected rather than coerced.
pub fn query_integer(raw: Option<&String>, message: &str) -> ServiceResult<Option<i64>> {
    match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ServiceError::bad_request(message)),
    }
}

/// Single-key JSON object.
pub fn object_of(key: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value.into());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_integer() {
        assert_eq!(as_integer(&json!(3)), Some(3));
        assert_eq!(as_integer(&json!(3.0)), Some(3));
        assert_eq!(as_integer(&json!("42")), Some(42));
        assert_eq!(as_integer(&json!(" 7 ")), Some(7));
        assert_eq!(as_integer(&json!(3.5)), None);
        assert_eq!(as_integer(&json!("abc")), None);
        assert_eq!(as_integer(&json!(null)), None);
        assert_eq!(as_integer(&json!(true)), None);
    }

    #[test]
    fn test_parse_object() {
        assert!(parse_object(&Bytes::new()).unwrap().is_empty());
        assert_eq!(parse_object(&Bytes::from_static(br#"{"a":1}"#)).unwrap()["a"], 1);
        assert!(matches!(
            parse_object(&Bytes::from_static(b"[1]")),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            parse_object(&Bytes::from_static(b"{nope")),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12", "userId").unwrap(), 12);
        assert_eq!(parse_id("abc", "userId").unwrap_err().to_string(), "Invalid userId");
        assert!(parse_id("-1", "userId").is_err());
    }

    #[test]
    fn test_query_integer() {
        assert_eq!(query_integer(None, "bad").unwrap(), None);
        assert_eq!(query_integer(Some(&"".to_string()), "bad").unwrap(), None);
        assert_eq!(query_integer(Some(&"5".to_string()), "bad").unwrap(), Some(5));
        assert_eq!(query_integer(Some(&"-3".to_string()), "bad").unwrap(), Some(-3));
        assert!(query_integer(Some(&"x".to_string()), "bad").is_err());
        for raw in ["5.0", "1e0", "0x1", "1_000"] {
            let err = query_integer(Some(&raw.to_string()), "Invalid orderId in query").unwrap_err();
            assert_eq!(err.to_string(), "Invalid orderId in query", "{} was accepted", raw);
        }
    }
}
