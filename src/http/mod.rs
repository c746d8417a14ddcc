//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve, middleware stack, graceful shutdown)
//!     → request.rs (x-request-id lookup)
//!     → [gateway or service router]
//!     → response.rs (JSON error bodies, panic boundary)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use response::json_error;
pub use server::HttpServer;
