//! # fedgraph HTTP API Module
//!
//! REST surface over a `FederatedStore`, built with axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /graphs` - Ids of the live members
//! - `POST /graphs` - Add a member graph
//! - `DELETE /graphs/{id}` - Remove a member graph
//! - `POST /schemas` - Persist a schema to the graph library
//! - `GET /schemas/{id}` - Fetch a schema from the graph library
//! - `GET /schema` - Merged schema of every member
//! - `POST /execute` - Run an operation chain
//!
//! Administrative endpoints are translated into single-operation chains, so
//! they pass through the same hooks as data queries.
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `FEDGRAPH_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `FEDGRAPH_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `FEDGRAPH_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    AddGraphRequest, ErrorResponse, ExecuteRequest, ExecuteResponse, GraphIdsResponse,
    HealthResponse,
};

use crate::federation::FederatedStore;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use fedgraph_core::GraphError;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body (element writes can be sizeable).
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FederatedStore>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<FederatedStore>) -> Self {
        Self { store }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from `FEDGRAPH_CORS_ORIGINS`.
///
/// - "*": allows all origins
/// - not set: localhost only
/// - otherwise: the comma-separated origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("FEDGRAPH_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (FEDGRAPH_CORS_ORIGINS=*). Do not use this in production."
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!(origin, "CORS: allowing origin");
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!(origin, error = %e, "CORS: invalid origin");
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: no valid origins in FEDGRAPH_CORS_ORIGINS, using localhost");
                build_localhost_cors()
            } else {
                restricted_cors(allowed_origins)
            }
        }
        None => {
            tracing::info!("CORS: FEDGRAPH_CORS_ORIGINS not set, using localhost");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();
    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(handlers::CORRELATION_HEADER),
        ])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!(rate_limit, "rate limiting enabled (requests/second)");
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - every endpoint is public. \
             Set FEDGRAPH_API_KEY to enable it."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/graphs",
            get(handlers::list_graphs_handler).post(handlers::add_graph_handler),
        )
        .route("/graphs/{id}", delete(handlers::remove_graph_handler))
        .route("/schemas", post(handlers::add_schema_handler))
        .route("/schemas/{id}", get(handlers::get_schema_handler))
        .route("/schema", get(handlers::merged_schema_handler))
        .route("/execute", post(handlers::execute_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve the API until ctrl-c.
pub async fn run_server(addr: &str, store: Arc<FederatedStore>) -> Result<(), GraphError> {
    let router = create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GraphError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!(addr, "fedgraph HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GraphError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
