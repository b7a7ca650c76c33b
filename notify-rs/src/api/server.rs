//! API Server - HTTP server for REST API

use axum::{
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::handlers::{self, ApiError, AppState, ADMIN_TOKEN_HEADER};

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: Arc<AppState>, addr: String) -> Self {
        Self { state, addr }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let public_routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/send/sms", post(handlers::send_sms))
            .route("/send/api", post(handlers::issue_key))
            .route("/queue/status", get(handlers::queue_status));

        let admin_routes = Router::new()
            .route("/counters", get(handlers::admin_counters))
            .route("/queues/:key", delete(handlers::admin_clear_queue))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                admin_middleware,
            ));

        Router::new()
            .merge(public_routes)
            .nest("/admin", admin_routes)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// Admin middleware - checks `x-admin-token`
async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("unauthorized", "Admin API is disabled")),
        )
            .into_response();
    };

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    if provided != Some(expected) {
        warn!("Rejected admin request to {}", req.uri().path());
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new("unauthorized", "Invalid admin token")),
        )
            .into_response();
    }

    next.run(req).await
}
