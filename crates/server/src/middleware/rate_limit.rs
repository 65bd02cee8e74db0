//! Per-client rate limiting for `/api` routes.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// Key used when no client address can be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Proxy headers consulted, most specific first.
const PROXY_HEADERS: [&str; 4] = [
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "fly-client-ip",
];

/// Whether requests to `path` count against the rate limit.
fn is_limited(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Determine the client address.
///
/// With `trust_proxy_headers` set, checks Cloudflare's `CF-Connecting-IP`
/// first, then the first hop of `X-Forwarded-For`, then `X-Real-IP` and
/// Fly.io's `Fly-Client-IP`. Falls back to the socket peer.
#[must_use]
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    if trust_proxy_headers {
        let from_headers = PROXY_HEADERS.iter().find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        });
        if from_headers.is_some() {
            return from_headers;
        }
    }
    peer
}

/// Middleware that rejects `/api` requests over the per-client limit with `429`.
///
/// # Errors
///
/// Returns `AppError::RateLimited` when the client has used up its window.
pub async fn limit_api_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !is_limited(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let key = client_address(
        request.headers(),
        peer,
        state.config().trust_proxy_headers,
    )
    .map_or_else(|| UNKNOWN_CLIENT.to_owned(), |ip| ip.to_string());

    if !state.rate_limiter().allow(&key) {
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
