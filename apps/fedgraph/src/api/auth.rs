//! # Authentication Module
//!
//! Optional API key authentication for the fedgraph HTTP API.
//!
//! ## Configuration
//!
//! Authentication is configured via environment variable:
//! - `FEDGRAPH_API_KEY`: If set and non-empty, every request except `/health`
//!   must carry this key
//!
//! ## Usage
//!
//! Send the key in the Authorization header:
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```
//!
//! A bare `<your-api-key>` without the `Bearer ` prefix is accepted too.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FEDGRAPH_API_KEY";

/// Get the API key from the environment.
///
/// # Returns
/// `Some(key)` if `FEDGRAPH_API_KEY` is set and non-empty, `None` otherwise,
/// which disables authentication.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Compare keys in constant time over the longer of the two lengths.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let len = provided.len().max(expected.len());
    let mut left = vec![0u8; len];
    let mut right = vec![0u8; len];
    left[..provided.len()].copy_from_slice(provided);
    right[..expected.len()].copy_from_slice(expected);
    let same_bytes: bool = left.ct_eq(&right).into();
    same_bytes && provided.len() == expected.len()
}

/// API key authentication middleware.
///
/// The key is read from the environment on every request, so it can be
/// rotated without a restart.
///
/// If `FEDGRAPH_API_KEY` is set:
/// - `/health` is always allowed, for load balancer checks
/// - All other endpoints require `Authorization: Bearer <key>`
///
/// # Returns
/// The inner response, or `401 Unauthorized` when the header is missing or
/// the key does not match.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(key) if keys_match(key.as_bytes(), expected.as_bytes()) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(event = "auth_failure", reason = "invalid_api_key", "authentication failed");
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "authentication failed"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_disables_authentication() {
        // SAFETY: No other unit test in this crate touches FEDGRAPH_API_KEY.
        unsafe { std::env::set_var(API_KEY_ENV, "") };
        assert!(get_api_key_from_env().is_none());
        // SAFETY: As above.
        unsafe { std::env::remove_var(API_KEY_ENV) };
        assert!(get_api_key_from_env().is_none());
    }

    #[test]
    fn equal_keys_match() {
        assert!(keys_match(b"secret", b"secret"));
    }

    #[test]
    fn prefixes_and_extensions_do_not_match() {
        assert!(!keys_match(b"secret", b"secret2"));
        assert!(!keys_match(b"secret2", b"secret"));
        assert!(!keys_match(b"", b"secret"));
    }
}
