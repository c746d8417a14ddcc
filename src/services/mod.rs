//! Backing services.
//!
//! # Data Flow
//! ```text
//! request → handler (parse + validate, 400 before any store call)
//!     read:  CacheAside::get_or_populate → Store on miss
//!     write: Store mutation → CacheAside::invalidate (keys, then prefixes)
//! ```
//!
//! Each service is a plain struct over a [`Store`] and a [`KvCache`]; the
//! axum router is a thin layer on top so the behavior is testable without
//! HTTP.

pub mod common;
pub mod orders;
pub mod reviews;
pub mod users;

use std::sync::Arc;

use axum::Router;

use crate::cache::KvCache;
use crate::config::{ServiceConfig, ServiceKind, UpstreamConfig};
use crate::storage::Store;
use crate::upstream::{Transport, UpstreamInvoker};

pub use common::{ServiceError, ServiceResult};
pub use orders::OrdersService;
pub use reviews::ReviewsService;
pub use users::UsersService;

/// Router for the service selected by `config.kind`.
pub fn build_router(
    config: &ServiceConfig,
    store: Arc<dyn Store>,
    cache: Arc<dyn KvCache>,
    transport: Arc<dyn Transport>,
) -> Router {
    let ttl = config.cache.clone();
    match config.kind {
        ServiceKind::Users => users::router(Arc::new(UsersService::new(store, cache, ttl))),
        ServiceKind::Orders => orders::router(Arc::new(OrdersService::new(store, cache, ttl))),
        ServiceKind::Reviews => {
            let upstream = UpstreamConfig::new("orders", "Orders", &config.dependencies.orders_url);
            let orders = UpstreamInvoker::new(&upstream, config.dependencies.breaker.clone(), transport);
            reviews::router(Arc::new(ReviewsService::new(store, cache, ttl, Arc::new(orders))))
        }
    }
}
