//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level so operators can raise
//! verbosity for one module without editing config.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// The crate and `tower_http` log at the configured level. Calling this
/// twice is harmless: the second install is ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let default_directive = format!(
        "resilient_gateway={level},tower_http={level}",
        level = config.log_level
    );

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
