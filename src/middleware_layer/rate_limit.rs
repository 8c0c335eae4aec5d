use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::SocketAddr;

use crate::{cache::CacheClient, config::RateLimitClass, error::AppError, state::AppState};

/// Placeholder client address when nothing resolvable is attached to the
/// request.
const UNKNOWN_ADDR: &str = "unknown";

/// The verdict for one request against one window.
struct WindowDecision {
    limit: i64,
    remaining: i64,
    reset_epoch: i64,
    /// Seconds until retry when the request is over the cap.
    retry_after: Option<i64>,
}

/// Resolves the client address: first hop of a forwarded-for chain when a
/// proxy supplied one, else the direct connection address.
pub fn extract_client_addr(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDR.to_string())
}

/// Counts this request against the client's current window.
///
/// INCR first, then set the TTL when the increment created the key: the
/// count itself is atomic, so concurrent requests cannot under-count. A
/// store failure returns `None` and the caller fails open - a cache outage
/// must not take all traffic down with it.
async fn check_window(
    cache: &CacheClient,
    scope: &str,
    addr: &str,
    class: RateLimitClass,
) -> Option<WindowDecision> {
    let key = format!("ratelimit:{}:{}", scope, addr);

    let count = match cache.increment(&key).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("⚠️  Rate limiter store error ({}), failing open", e);
            return None;
        }
    };

    if count == 1 {
        if let Err(e) = cache.expire(&key, class.window_seconds).await {
            tracing::warn!("⚠️  Failed to arm rate-limit window for {}: {}", key, e);
        }
    }

    let ttl = match cache.ttl(&key).await {
        Ok(ttl) if ttl > 0 => ttl,
        _ => class.window_seconds,
    };

    Some(WindowDecision {
        limit: class.max_requests,
        remaining: (class.max_requests - count).max(0),
        reset_epoch: Utc::now().timestamp() + ttl,
        retry_after: (count > class.max_requests).then_some(ttl),
    })
}

/// Attaches the limiter metadata to a response, allowed or not.
fn apply_headers(headers: &mut HeaderMap, decision: &WindowDecision) {
    let pairs = [
        ("x-ratelimit-limit", decision.limit),
        ("x-ratelimit-remaining", decision.remaining),
        ("x-ratelimit-reset", decision.reset_epoch),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    }
}

async fn enforce(
    state: AppState,
    scope: &str,
    class: RateLimitClass,
    request: Request<Body>,
    next: Next,
) -> Response {
    let addr = extract_client_addr(&request);

    let Some(decision) = check_window(&state.cache, scope, &addr, class).await else {
        return next.run(request).await;
    };

    if let Some(retry_after) = decision.retry_after {
        let mut response = AppError::RateLimitExceeded { retry_after }.into_response();
        apply_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

/// Fixed-window rate limit for the general route class.
pub async fn rate_limit_general(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let class = state.config.rate_limit_general;
    enforce(state, "general", class, request, next).await
}

/// Stricter fixed-window rate limit for authentication-adjacent routes.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let class = state.config.rate_limit_auth;
    enforce(state, "auth", class, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_chain_prefers_first_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1, 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_addr(&request), "203.0.113.9");
    }

    #[test]
    fn connection_address_is_the_fallback() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        let addr: SocketAddr = "192.0.2.4:51234".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(extract_client_addr(&request), "192.0.2.4");
    }

    #[test]
    fn unresolvable_address_uses_placeholder() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_addr(&request), UNKNOWN_ADDR);
    }

    #[test]
    fn empty_forwarded_header_falls_through() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "  ")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "192.0.2.4:51234".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(extract_client_addr(&request), "192.0.2.4");
    }
}
