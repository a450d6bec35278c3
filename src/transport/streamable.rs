//! StreamableHTTP transport front-end.
//!
//! A session is created by a `POST /mcp` carrying an `initialize` request
//! with no session header; the issued id is returned in the
//! `mcp-session-id` response header and must accompany every subsequent
//! request. Requests with a missing or unknown session id (other than
//! initialize) receive an HTTP 400 with a JSON-RPC error envelope.
//!
//! `GET /mcp` opens a keep-alive event stream for a session; `DELETE /mcp`
//! closes the session.

use crate::constants::{MAX_BODY_SIZE, SESSION_ID_HEADER};
use crate::handlers;
use crate::protocol::{error_codes, session_error_envelope, JsonRpcRequest, JsonRpcResponse};
use crate::transport::middleware::CallerIdentity;
use crate::transport::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::convert::Infallible;
use tracing::{debug, info};
use uuid::Uuid;

/// Session ids issued by this transport.
///
/// Validity is per-transport; the shared identity registry only resolves who
/// a session belongs to.
#[derive(Default)]
pub struct StreamableSessions {
    sessions: RwLock<HashSet<String>>,
}

impl StreamableSessions {
    fn insert(&self, session_id: &str) {
        self.sessions.write().insert(session_id.to_string());
    }

    fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains(session_id)
    }

    fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id)
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// `ALL /mcp`: route by HTTP method.
pub async fn handle(State(state): State<AppState>, request: Request) -> Response {
    match *request.method() {
        Method::POST => handle_post(state, request).await,
        Method::GET => handle_get(state, &request),
        Method::DELETE => handle_delete(state, &request),
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, POST, DELETE")],
        )
            .into_response(),
    }
}

async fn handle_post(state: AppState, request: Request) -> Response {
    let caller = request
        .extensions()
        .get::<CallerIdentity>()
        .cloned()
        .unwrap_or(CallerIdentity::Anonymous);
    let session_header = header_session_id(request.headers());

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Failed to read request body: {e}"),
                )),
            )
                .into_response();
        }
    };

    let rpc: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(rpc) => rpc,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                )),
            )
                .into_response();
        }
    };

    match session_header {
        // Established session.
        Some(session_id) if state.streamable_sessions.contains(&session_id) => {
            debug!(session_id = %session_id, method = %rpc.method, "StreamableHTTP message received");
            match handlers::handle_request(&state.gateway, &session_id, rpc).await {
                Some(response) => (
                    [(SESSION_ID_HEADER, session_id.as_str())],
                    Json(response),
                )
                    .into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            }
        }

        // Stale or foreign session id.
        Some(_) => session_error(StatusCode::BAD_REQUEST, "Session not found"),

        // New session: only an initialize request may create one.
        None if rpc.is_initialize() => {
            let session_id = Uuid::new_v4().to_string();
            state.streamable_sessions.insert(&session_id);
            state
                .gateway
                .sessions()
                .register(caller.into_session_identity(&session_id));
            info!(session_id = %session_id, "StreamableHTTP session initialized");

            match handlers::handle_request(&state.gateway, &session_id, rpc).await {
                Some(response) => (
                    [(SESSION_ID_HEADER, session_id.as_str())],
                    Json(response),
                )
                    .into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            }
        }

        None => session_error(
            StatusCode::BAD_REQUEST,
            "Bad Request: Mcp-Session-Id header is required",
        ),
    }
}

/// `GET /mcp`: keep-alive event stream for server-initiated messages.
///
/// The gateway currently pushes nothing, so the stream only carries
/// keep-alive comments; it exists for protocol completeness.
fn handle_get(state: AppState, request: &Request) -> Response {
    let Some(session_id) = header_session_id(request.headers()) else {
        return session_error(
            StatusCode::BAD_REQUEST,
            "Bad Request: Mcp-Session-Id header is required",
        );
    };

    if !state.streamable_sessions.contains(&session_id) {
        return session_error(StatusCode::BAD_REQUEST, "Session not found");
    }

    let stream = stream::pending::<Result<Event, Infallible>>();
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn handle_delete(state: AppState, request: &Request) -> Response {
    let Some(session_id) = header_session_id(request.headers()) else {
        return session_error(
            StatusCode::BAD_REQUEST,
            "Bad Request: Mcp-Session-Id header is required",
        );
    };

    if state.streamable_sessions.remove(&session_id) {
        state.gateway.sessions().unregister(&session_id);
        info!(session_id = %session_id, "StreamableHTTP session closed");
        StatusCode::OK.into_response()
    } else {
        session_error(StatusCode::BAD_REQUEST, "Session not found")
    }
}

fn header_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// HTTP error carrying the `{jsonrpc, error:{code:-32000,...}, id:null}`
/// envelope.
fn session_error(status: StatusCode, message: &str) -> Response {
    (status, Json(session_error_envelope(message))).into_response()
}
