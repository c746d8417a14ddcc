//! One logical call to an upstream through its circuit breaker.
//!
//! # Classification
//! ```text
//! 2xx                              → Invocation::Success
//! status in application_statuses   → Invocation::ApplicationError (neutral)
//! other status / transport error   → failure, counted by the breaker
//! breaker open / failure / timeout → Invocation::Fallback
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{BreakerConfig, UpstreamConfig};
use crate::observability::metrics;
use crate::resilience::{Accounted, BreakerError, BreakerSnapshot, CircuitBreaker};
use crate::upstream::outcome::{FallbackReason, Invocation};
use crate::upstream::transport::{Transport, TransportError, UpstreamRequest, UpstreamResponse};

/// Non-fault completion of the guarded call.
#[derive(Debug)]
enum Reply {
    Success(UpstreamResponse),
    Application(UpstreamResponse),
}

impl Accounted for Reply {
    fn is_application_error(&self) -> bool {
        matches!(self, Reply::Application(_))
    }
}

#[derive(Debug, Error)]
enum CallFault {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected upstream status {0}")]
    Status(u16),
}

/// Breaker-guarded caller for one upstream.
#[derive(Debug)]
pub struct UpstreamInvoker {
    name: String,
    label: String,
    base_url: String,
    application_statuses: Vec<u16>,
    breaker: CircuitBreaker,
    transport: Arc<dyn Transport>,
}

impl UpstreamInvoker {
    pub fn new(upstream: &UpstreamConfig, breaker: BreakerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: upstream.name.clone(),
            label: upstream.label.clone(),
            base_url: upstream.base_url.clone(),
            application_statuses: upstream.application_statuses.clone(),
            breaker: CircuitBreaker::new(upstream.name.clone(), breaker),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Payload served when the upstream can't answer.
    pub fn fallback_payload(&self) -> Value {
        json!({ "error": format!("{} service temporarily unavailable", self.label) })
    }

    /// Perform the call on its own task.
    ///
    /// The call runs to completion (or to the breaker timeout) even if the
    /// inbound request is dropped, so every admitted call is accounted.
    pub async fn invoke(self: &Arc<Self>, request: UpstreamRequest) -> Invocation {
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.call(request).await }).await {
            Ok(invocation) => invocation,
            Err(e) => {
                tracing::error!(upstream = %self.name, error = %e, "Upstream call task failed");
                self.fallback(FallbackReason::Failure)
            }
        }
    }

    /// Perform the call inline on the current task.
    pub async fn call(&self, request: UpstreamRequest) -> Invocation {
        let start = Instant::now();
        let result = self.breaker.call(|| self.send(&request)).await;

        let invocation = match result {
            Ok(Reply::Success(response)) => Invocation::Success {
                status: response.status,
                body: response.body,
            },
            Ok(Reply::Application(response)) => {
                tracing::debug!(
                    upstream = %self.name,
                    status = response.status.as_u16(),
                    path = %request.path_and_query,
                    "Upstream returned application error"
                );
                Invocation::ApplicationError {
                    status: response.status,
                    body: response.body,
                }
            }
            Err(BreakerError::Open { .. }) => {
                tracing::debug!(upstream = %self.name, "Breaker open, serving fallback");
                self.fallback(FallbackReason::BreakerOpen)
            }
            Err(BreakerError::Timeout { .. }) => self.fallback(FallbackReason::Timeout),
            Err(BreakerError::Failed(fault)) => {
                tracing::warn!(
                    upstream = %self.name,
                    request_id = request.request_id.as_deref().unwrap_or("-"),
                    error = %fault,
                    "Upstream call failed"
                );
                self.fallback(FallbackReason::Failure)
            }
        };

        metrics::record_upstream_call(&self.name, invocation.outcome(), start);
        invocation
    }

    async fn send(&self, request: &UpstreamRequest) -> Result<Reply, CallFault> {
        let response = self.transport.send(&self.base_url, request).await?;
        let status = response.status.as_u16();

        if response.status.is_success() {
            Ok(Reply::Success(response))
        } else if self.application_statuses.contains(&status) {
            Ok(Reply::Application(response))
        } else {
            Err(CallFault::Status(status))
        }
    }

    fn fallback(&self, reason: FallbackReason) -> Invocation {
        self.breaker.record_fallback();
        Invocation::Fallback {
            payload: self.fallback_payload(),
            reason,
        }
    }
}
