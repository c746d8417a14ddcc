//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap an application router with the shared middleware stack
//! - Bind it to a listener and serve until shutdown
//!
//! # Middleware (outermost first)
//! ```text
//! CatchPanicLayer       → unclassified faults become JSON 500
//! SetRequestIdLayer     → x-request-id (UUID v4) when the caller sent none
//! TraceLayer            → access log span per request
//! PropagateRequestId    → echo x-request-id on the response
//! TimeoutLayer          → inbound request deadline
//! ```

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::request::request_id_header;
use crate::http::response::panic_response;

/// HTTP server shared by the gateway and the backing services.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Wrap `app` with the middleware stack.
    pub fn new(app: Router, request_timeout: Duration) -> Self {
        Self {
            router: Self::apply_layers(app, request_timeout),
        }
    }

    #[allow(deprecated)]
    fn apply_layers(app: Router, request_timeout: Duration) -> Router {
        app.layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::new(request_id_header()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
            .layer(CatchPanicLayer::custom(panic_response))
    }

    /// The fully layered router (for in-process tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until the shutdown signal fires, then drain.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
