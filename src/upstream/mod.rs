//! Upstream calling subsystem.
//!
//! # Data Flow
//! ```text
//! gateway handler / reviews service
//!     → pool.rs (look up the invoker for a resource)
//!     → invoker.rs (breaker-guarded call, classification, fallback)
//!     → transport.rs (HTTP request to the upstream base URL)
//!     → outcome.rs (Invocation the caller pattern-matches)
//! ```

pub mod invoker;
pub mod outcome;
pub mod pool;
pub mod transport;

pub use invoker::UpstreamInvoker;
pub use outcome::{FallbackReason, Invocation};
pub use pool::UpstreamPool;
pub use transport::{HyperTransport, Transport, TransportError, UpstreamRequest, UpstreamResponse};
