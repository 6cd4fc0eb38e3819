use crate::{
    app::AppContext,
    config::ServerConfig,
    http::RouteModule,
    middleware::{MakeRequestUuid, expose_error_details, request_span},
};
use axum::{Router, body::Body, extract::DefaultBodyLimit, routing::get};
use std::time::Duration;
use tokio::signal;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// HTTP application: routes, middleware and shared state.
pub struct App {
    router: Router<AppContext>,
    server: ServerConfig,
    context: AppContext,
}

impl App {
    /// Creates an app exposing `/health`; register modules for the rest.
    pub fn new(server: ServerConfig, context: AppContext) -> Self {
        let router = Router::<AppContext>::new().route("/health", get(crate::health::health_handler));
        Self {
            router,
            server,
            context,
        }
    }

    /// Register a route module with the application
    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    /// Apply the middleware stack and the shared state.
    ///
    /// Used by `serve` and by tests driving the router with `oneshot`.
    pub fn into_router(self) -> Router {
        let mut router = self.router;

        if self.context.dev_mode {
            tracing::warn!("Dev mode: internal error details are returned to clients");
            router = router.layer(axum::middleware::map_response(expose_error_details));
        }

        // Middleware order (from inner to outer as written):
        // 1. Body size limit - reject large bodies early
        router = router.layer(DefaultBodyLimit::max(self.server.max_body_size));

        // 2. Timeout - bounds the whole request, including the batch
        if self.server.request_timeout_seconds > 0 {
            router = router.layer(TimeoutLayer::new(Duration::from_secs(
                self.server.request_timeout_seconds,
            )));
        }

        // 3. Trace layer - HTTP tracing, inside the request-id layers so the span sees the id
        router = router.layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>));

        // 4. Request ID - set outermost, so propagation and tracing both see it
        router = router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        router.with_state(self.context)
    }

    /// Start the application server
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let addr = self
            .server
            .addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let router = self.into_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!("Health check available at http://{}/health", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
