//! Result of one logical upstream call.

use axum::http::StatusCode;
use serde_json::Value;

/// Why a fallback payload was served instead of an upstream answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Breaker open: the call never ran.
    BreakerOpen,
    /// Call exceeded the breaker's per-call timeout.
    Timeout,
    /// Connection error or unexpected status.
    Failure,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::BreakerOpen => "breaker_open",
            FallbackReason::Timeout => "timeout",
            FallbackReason::Failure => "failure",
        }
    }
}

/// What an [`UpstreamInvoker`](super::UpstreamInvoker) call produced.
///
/// Never an error: every path yields something the gateway can answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// 2xx from the upstream.
    Success { status: StatusCode, body: Value },

    /// Domain outcome (not found, conflict, rejected input), passed through
    /// verbatim and neutral for breaker health.
    ApplicationError { status: StatusCode, body: Value },

    /// Configured fallback payload.
    Fallback { payload: Value, reason: FallbackReason },
}

impl Invocation {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Invocation::Fallback { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Invocation::ApplicationError { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Invocation::Success { .. } => "success",
            Invocation::ApplicationError { .. } => "application_error",
            Invocation::Fallback { .. } => "fallback",
        }
    }

    /// Human message carried by a fallback payload.
    pub fn fallback_message(&self) -> Option<&str> {
        match self {
            Invocation::Fallback { payload, .. } => payload.get("error").and_then(Value::as_str),
            _ => None,
        }
    }
}
