//! Legacy SSE transport front-end.
//!
//! `GET /sse` opens the event stream: the first event is `endpoint` carrying
//! the message-post URL tagged with the generated session id; subsequent
//! `message` events carry JSON-RPC responses. `POST /sse` submits a JSON-RPC
//! message for an existing session and returns 202; the response is
//! delivered on the stream. Closing the stream tears the session down.

use crate::constants::{SESSION_ID_HEADER, SESSION_ID_QUERY_PARAM};
use crate::handlers;
use crate::protocol::{error_codes, JsonRpcRequest, JsonRpcResponse};
use crate::server::McpGateway;
use crate::transport::middleware::CallerIdentity;
use crate::transport::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures_util::stream::{self, Stream, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-session event channels for open SSE streams.
///
/// Transport-owned state, separate from the identity registry: the registry
/// holds no transport handles.
#[derive(Default)]
pub struct SseChannels {
    channels: RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>,
}

impl SseChannels {
    fn insert(&self, session_id: &str, sender: mpsc::UnboundedSender<Event>) {
        self.channels.write().insert(session_id.to_string(), sender);
    }

    fn sender(&self, session_id: &str) -> Option<mpsc::UnboundedSender<Event>> {
        self.channels.read().get(session_id).cloned()
    }

    fn remove(&self, session_id: &str) {
        self.channels.write().remove(session_id);
    }

    /// Number of open streams.
    pub fn open_count(&self) -> usize {
        self.channels.read().len()
    }
}

/// Unregisters the session when the client disconnects.
struct SessionCleanup {
    session_id: String,
    gateway: Arc<McpGateway>,
    channels: Arc<SseChannels>,
}

impl Drop for SessionCleanup {
    fn drop(&mut self) {
        self.channels.remove(&self.session_id);
        self.gateway.sessions().unregister(&self.session_id);
        info!(session_id = %self.session_id, "SSE session closed");
    }
}

/// `GET /sse`: open an event stream and announce the session's POST endpoint.
///
/// The authentication middleware attaches the caller identity before any
/// protected route runs, so the extension is always present here.
pub async fn open_stream(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    state
        .gateway
        .sessions()
        .register(caller.into_session_identity(&session_id));

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    state.sse_channels.insert(&session_id, tx);
    info!(session_id = %session_id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/sse?{SESSION_ID_QUERY_PARAM}={session_id}"));

    // Dropped with the stream when the client disconnects.
    let cleanup = SessionCleanup {
        session_id,
        gateway: state.gateway.clone(),
        channels: state.sse_channels.clone(),
    };

    let stream = stream::once(std::future::ready(Ok(endpoint))).chain(stream::poll_fn(
        move |cx| {
            let _bound_to_stream = &cleanup;
            rx.poll_recv(cx).map(|event| event.map(Ok))
        },
    ));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Query parameters accepted by `POST /sse`.
#[derive(Debug, Deserialize)]
pub struct PostQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `POST /sse`: dispatch a JSON-RPC message for an open stream.
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or(query.session_id);

    let Some(session_id) = session_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing session ID" })),
        )
            .into_response();
    };

    let Some(sender) = state.sse_channels.sender(&session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Session not found" })),
        )
            .into_response();
    };

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
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

    debug!(session_id = %session_id, method = %request.method, "SSE message received");

    if let Some(response) = handlers::handle_request(&state.gateway, &session_id, request).await {
        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(JsonRpcResponse::error(
                        Value::Null,
                        error_codes::INTERNAL_ERROR,
                        format!("Failed to serialize response: {e}"),
                    )),
                )
                    .into_response();
            }
        };

        let event = Event::default().event("message").data(payload);
        if sender.send(event).is_err() {
            // Stream went away between lookup and send.
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Session closed" })),
            )
                .into_response();
        }
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
