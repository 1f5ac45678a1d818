//! Bearer-token authentication for the execution surface.
//!
//! A fresh token is generated at startup and handed to the bridge (and any
//! generated code) through the environment. Every non-`OPTIONS` request must
//! present it; comparison is constant-time so the token cannot be probed
//! byte by byte.

use crate::handlers::ExecuteResponse;
use crate::ApiState;
use axum::extract::{Request, State};
use axum::http::{header::AUTHORIZATION, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::RngCore;

/// Number of random bytes in a freshly generated token.
const TOKEN_BYTES: usize = 32;

/// A bearer token for the execution surface.
#[derive(Debug, Clone)]
pub struct AuthToken {
    value: String,
}

impl AuthToken {
    /// Generates a new token: 32 cryptographically random bytes, hex-encoded.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            value: hex::encode(bytes),
        }
    }

    /// Wraps a known token value (tests, externally provisioned tokens).
    #[must_use]
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The token string to export to callers.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Constant-time comparison against a presented token.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        constant_time_eq(self.value.as_bytes(), presented.as_bytes())
    }
}

/// Byte-wise constant-time equality. Length mismatch short-circuits, which
/// leaks only the length, and the token length is public anyway.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Middleware enforcing `Authorization: Bearer <token>` on every request
/// except CORS preflight.
pub async fn require_bearer(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header) = header else {
        return unauthorized("missing Authorization header");
    };
    let Some(presented) = header.strip_prefix("Bearer ") else {
        return unauthorized("malformed Authorization header, expected Bearer token");
    };
    if !state.token.matches(presented) {
        return unauthorized("invalid token");
    }

    next.run(request).await
}

fn unauthorized(reason: &str) -> Response {
    tracing::debug!(event = "auth_rejected", reason, "rejecting request");
    (
        StatusCode::UNAUTHORIZED,
        Json(ExecuteResponse::failure(reason)),
    )
        .into_response()
}
