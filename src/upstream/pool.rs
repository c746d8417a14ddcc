//! Upstream registry.
//!
//! # Responsibilities
//! - Own one invoker (and so one breaker) per configured upstream
//! - Look invokers up by resource name
//! - Report every breaker for `/health`

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::resilience::BreakerSnapshot;
use crate::upstream::invoker::UpstreamInvoker;
use crate::upstream::transport::Transport;

/// Lifecycle-scoped registry of upstream invokers.
#[derive(Debug, Default)]
pub struct UpstreamPool {
    invokers: BTreeMap<String, Arc<UpstreamInvoker>>,
}

impl UpstreamPool {
    /// Build one invoker per configured upstream, all sharing `transport`.
    pub fn from_config(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        let mut invokers = BTreeMap::new();
        for upstream in &config.upstreams {
            let breaker = config.breaker_for(upstream);
            tracing::info!(
                upstream = %upstream.name,
                base_url = %upstream.base_url,
                "Registering upstream"
            );
            let invoker = UpstreamInvoker::new(upstream, breaker, transport.clone());
            invokers.insert(upstream.name.clone(), Arc::new(invoker));
        }
        Self { invokers }
    }

    pub fn get(&self, name: &str) -> Option<Arc<UpstreamInvoker>> {
        self.invokers.get(name).cloned()
    }

    /// Breaker snapshots keyed by upstream name.
    pub fn snapshots(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.invokers
            .iter()
            .map(|(name, invoker)| (name.clone(), invoker.snapshot()))
            .collect()
    }
}
