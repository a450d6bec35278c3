//! HTTP transport hosting both MCP front-ends.
//!
//! Routes:
//! - `GET /health` - public health check, no authentication
//! - `GET/POST /sse` - legacy SSE transport
//! - `ALL /mcp` - StreamableHTTP transport
//!
//! All non-health routes sit behind API-key authentication and optional
//! per-IP rate limiting. Many concurrent client sessions on either transport
//! multiplex onto the single tool dispatcher.

pub mod middleware;
pub mod sse;
pub mod streamable;

use crate::config::HttpConfig;
use crate::constants::{MCP_PROTOCOL_VERSION, SERVICE_NAME};
use crate::server::McpGateway;
use axum::http::HeaderValue;
use axum::middleware as axum_middleware;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use chrono::Utc;
use middleware::RateLimiter;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<McpGateway>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sse_channels: Arc<sse::SseChannels>,
    pub streamable_sessions: Arc<streamable::StreamableSessions>,
}

impl AppState {
    /// Create transport state for a gateway.
    pub fn new(gateway: Arc<McpGateway>) -> Self {
        let http = &gateway.config().http;
        let rate_limiter = Arc::new(RateLimiter::new(
            http.rate_limit_max_requests,
            http.rate_limit_window,
        ));
        Self {
            gateway,
            rate_limiter,
            sse_channels: Arc::new(sse::SseChannels::default()),
            streamable_sessions: Arc::new(streamable::StreamableSessions::default()),
        }
    }
}

/// Build the HTTP router for the gateway.
pub fn build_router(gateway: Arc<McpGateway>) -> Router {
    let cors = cors_layer(&gateway.config().http);
    let state = AppState::new(gateway);

    // Health stays outside the middleware stack: it must answer without a
    // key so container probes and deployment smoke tests can reach it.
    let protected = Router::new()
        .route("/sse", get(sse::open_stream).post(sse::post_message))
        .route("/mcp", any(streamable::handle))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_api_key,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server until a shutdown signal arrives.
pub async fn serve(gateway: McpGateway) -> anyhow::Result<()> {
    let http = gateway.config().http.clone();
    let app = build_router(Arc::new(gateway));

    let addr = format!("{}:{}", http.host, http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("HTTP server listening on http://{addr}");
    info!("MCP endpoint: http://{addr}/mcp");
    info!("SSE endpoint: http://{addr}/sse");
    info!("Health endpoint: http://{addr}/health");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Health check handler. Public by design.
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": MCP_PROTOCOL_VERSION,
    }))
}

/// Build the CORS layer from the configured origin allow-list.
fn cors_layer(config: &HttpConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    if config.cors_origins.is_empty() {
        layer.allow_origin(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
