//! Admission control in front of each route.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::GatewayState;
use crate::ratelimit::{Decision, LimitKey};

/// Body of a rejected request.
pub const REJECTION_MESSAGE: &str = "You have reached maximum request limit.";

/// Requests admitted per window.
pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
/// Window length in seconds.
pub const X_RATE_LIMIT_DURATION: HeaderName = HeaderName::from_static("x-rate-limit-duration");
/// Requests still admitted in the current window; only set on admitted responses.
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");

/// Reject the request with `429 Too Many Requests` once its key is over the limit.
///
/// Runs before the handler, so a rejected request never has its body read
/// and never reaches the simulated processing delay.
pub async fn rate_limit(
    State(state): State<GatewayState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = request_key(&state, &request);
    let decision = state.limiter.check(&key);
    let window = state.limiter.config().window;

    if !decision.allowed {
        debug!(
            key = %key,
            retry_after_ms = decision.reset_after.as_millis() as u64,
            "request rejected"
        );
        return too_many_requests(&decision, window);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    set_limit_headers(headers, &decision, window);
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    response
}

fn request_key(state: &GatewayState, request: &Request<Body>) -> LimitKey {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or_else(|| request.uri().path());

    let rl = &state.config.rate_limiting;
    LimitKey::for_strategy(rl.key_strategy, route, || {
        let socket_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|value| value.0);
        client_identity(request.headers(), socket_addr, rl.trust_proxy)
    })
}

fn too_many_requests(decision: &Decision, window: Duration) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        REJECTION_MESSAGE,
    )
        .into_response();

    let headers = response.headers_mut();
    set_limit_headers(headers, decision, window);
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(retry_after_secs(decision.reset_after)),
    );
    response
}

fn set_limit_headers(headers: &mut HeaderMap, decision: &Decision, window: Duration) {
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    if let Ok(value) = HeaderValue::from_str(&window.as_secs_f64().to_string()) {
        headers.insert(X_RATE_LIMIT_DURATION, value);
    }
}

/// Whole seconds until the window resets, rounded up and at least one.
fn retry_after_secs(reset_after: Duration) -> u64 {
    let secs = reset_after.as_secs() + u64::from(reset_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Best-effort client address for per-client keys.
pub fn client_identity(
    headers: &HeaderMap,
    socket_addr: Option<SocketAddr>,
    trust_proxy: bool,
) -> String {
    if trust_proxy {
        if let Some(value) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            if let Some(first) = value.split(',').next() {
                let candidate = first.trim();
                if !candidate.is_empty() {
                    return candidate.to_string();
                }
            }
        }

        if let Some(value) = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
        {
            let candidate = value.trim();
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
    }

    socket_addr
        .map(|address| address.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
