//! Authenticated principal contract.
//!
//! Authentication and session storage live outside the core. The session
//! collaborator inserts a `Principal` request extension after validating
//! the session; handlers take it as an extractor argument and the core
//! never touches ambient session state.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::CoreError;

/// The authenticated caller, as established by the session collaborator.
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| CoreError::unauthorized("no authenticated session"))
    }
}

/// Header set by the trusted session front end.
pub const USER_HEADER: &str = "x-loadflow-user";

/// Bridge middleware for deployments where the session collaborator runs as
/// a front proxy: trusts `x-loadflow-user` and promotes it to a
/// `Principal` extension. Tests insert the extension directly instead.
pub async fn principal_from_headers(mut request: Request<axum::body::Body>, next: Next) -> Response {
    if let Some(username) = request
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        let principal = Principal {
            username: username.to_string(),
        };
        request.extensions_mut().insert(principal);
    }
    next.run(request).await
}
