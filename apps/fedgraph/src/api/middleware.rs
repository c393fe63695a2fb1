//! # Middleware Module
//!
//! Rate limiting for the fedgraph HTTP API. One global token bucket is
//! shared by every route.
//!
//! ## Configuration
//!
//! Rate limiting is configured via environment variable:
//! - `FEDGRAPH_RATE_LIMIT`: Requests per second (default: 100). `0` turns the
//!   limiter off when the router is built.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Environment variable holding the rate limit.
pub const RATE_LIMIT_ENV: &str = "FEDGRAPH_RATE_LIMIT";

/// Default rate limit: 100 requests per second.
const DEFAULT_RPS: u32 = 100;

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new global rate limiter.
///
/// # Arguments
/// * `requests_per_second` - Maximum requests per second, also the burst size.
///   Zero falls back to the default.
///
/// # Returns
/// A thread-safe rate limiter wrapped in Arc.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second)
        .or_else(|| NonZeroU32::new(DEFAULT_RPS))
        .unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Get the rate limit from the environment.
///
/// Returns the value of `FEDGRAPH_RATE_LIMIT`, or 100 if it is unset or not
/// a number.
pub fn get_rate_limit_from_env() -> u32 {
    std::env::var(RATE_LIMIT_ENV)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RPS)
}

/// Rate limiting middleware.
///
/// Checks the global rate limiter before letting a request through.
/// Returns 429 Too Many Requests once the bucket is empty.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
        return Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"));
    }
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================
