//! Bearer token request gate.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::ApiError;

/// The shared secret callers must present.
#[derive(Clone)]
pub struct BearerToken(Arc<str>);

impl BearerToken {
    /// Wraps the expected token.
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// Whether an `Authorization` header value carries this token.
    #[must_use]
    pub fn accepts(&self, header: Option<&str>) -> bool {
        header
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| presented.as_bytes().ct_eq(self.0.as_bytes()).into())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Rejects requests without `Authorization: Bearer <token>` with 401.
///
/// Runs before any extractor of the wrapped route, so a rejected request
/// never reaches business logic.
pub async fn require_bearer(
    State(token): State<BearerToken>,
    request: Request,
    next: Next,
) -> Response {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let mut headers = request.headers().clone();
        if let Some(value) = headers.get_mut(AUTHORIZATION) {
            value.set_sensitive(true);
        }
        tracing::debug!(method = %request.method(), uri = %request.uri(), ?headers, "Request headers");
    }

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !token.accepts(presented) {
        tracing::warn!(uri = %request.uri(), "Rejected unauthenticated request");
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_only_exact_bearer() {
        let token = BearerToken::new("s3cret");
        assert!(token.accepts(Some("Bearer s3cret")));
        assert!(!token.accepts(None));
        assert!(!token.accepts(Some("s3cret")));
        assert!(!token.accepts(Some("Bearer s3cret ")));
        assert!(!token.accepts(Some("Bearer s3cre")));
        assert!(!token.accepts(Some("bearer s3cret")));
        assert!(!token.accepts(Some("Basic s3cret")));
    }
}
