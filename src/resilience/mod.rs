//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an upstream:
//!     → circuit_breaker.rs (admit or short-circuit, bound by the call timeout)
//!     → window.rs (record the outcome in the rolling window)
//!     → circuit_breaker.rs (evaluate threshold, transition)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No retries: a failed call is reported once and the fallback is served
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod window;

pub use circuit_breaker::{Accounted, BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use window::{Event, WindowCounts};
