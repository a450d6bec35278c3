//! API-key authentication and per-IP rate limiting.

use crate::session::SessionIdentity;
use crate::transport::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tracing::warn;

/// User id recorded for callers authenticated with the shared API key.
const API_KEY_USER_ID: &str = "api-key";

/// Caller context resolved by the authentication middleware and attached to
/// the request for the transport handlers.
#[derive(Debug, Clone)]
pub enum CallerIdentity {
    /// No key configured, or none required.
    Anonymous,

    /// Caller presented the configured API key.
    ApiKey { principal: Option<String> },
}

impl CallerIdentity {
    /// Bind this caller context to a transport session.
    pub fn into_session_identity(self, session_id: &str) -> SessionIdentity {
        match self {
            CallerIdentity::Anonymous => SessionIdentity::anonymous(session_id),
            CallerIdentity::ApiKey { principal } => {
                SessionIdentity::new(session_id, API_KEY_USER_ID, principal)
            }
        }
    }
}

/// Require the configured API key on every request.
///
/// Accepts `X-API-Key: <key>` or `Authorization: Bearer <key>`. When no key
/// is configured server-side, authentication is bypassed and every caller is
/// treated as anonymous.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.gateway.config().http.api_key.clone() else {
        request.extensions_mut().insert(CallerIdentity::Anonymous);
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| bearer_token(request.headers()));

    match presented {
        None => {
            warn!(path = %request.uri().path(), "request rejected: missing API key");
            unauthorized("Missing API key")
        }
        Some(key) if key == expected => {
            let principal = state.gateway.config().http.api_key_principal.clone();
            request
                .extensions_mut()
                .insert(CallerIdentity::ApiKey { principal });
            next.run(request).await
        }
        Some(_) => {
            warn!(path = %request.uri().path(), "request rejected: invalid API key");
            unauthorized("Invalid API key")
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized", "message": message })),
    )
        .into_response()
}

/// Fixed-window request counter per caller IP.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<HashMap<IpAddr, WindowState>>,
}

struct WindowState {
    started: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimiter {
    /// Create a limiter with the given budget per window.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one request slot for `ip`.
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> RateDecision {
        let mut buckets = self.buckets.lock();
        let state = buckets.entry(ip).or_insert(WindowState {
            started: now,
            count: 0,
        });

        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count >= self.max_requests {
            let retry_after = self.window.saturating_sub(now.duration_since(state.started));
            return RateDecision::Limited { retry_after };
        }

        state.count += 1;
        RateDecision::Allowed
    }
}

/// Enforce the per-IP request budget when rate limiting is enabled.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.gateway.config().http.rate_limit_enabled {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    match state.rate_limiter.check(ip) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            let seconds = retry_after.as_secs().max(1);
            warn!(%ip, "request rejected: rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds.to_string())],
                Json(json!({
                    "error": "Too Many Requests",
                    "message": format!("Rate limit exceeded; retry in {seconds} second(s)"),
                    "retryAfterSeconds": seconds,
                })),
            )
                .into_response()
        }
    }
}

/// Resolve the caller IP: first hop of `X-Forwarded-For` (the gateway sits
/// behind the Container Apps ingress), falling back to the socket address.
fn client_ip(request: &Request) -> IpAddr {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
