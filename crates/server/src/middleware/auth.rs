//! Authentication extractors.
//!
//! Read the [`Identity`] placed in request extensions by
//! [`super::session::resolve_identity`] and apply the session guards.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};

use super::session::Identity;
use crate::models::CurrentUser;
use crate::services::{AuthError, require_admin, require_authenticated};

/// Extractor that requires an authenticated caller.
///
/// API requests without a session get `401`; page requests are redirected
/// to the login page.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires an authenticated caller with the admin role.
pub struct RequireAdmin(pub CurrentUser);

/// Extractor that optionally gets the current caller.
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Error returned when a guard rejects the request.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for page requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Authenticated but lacking the required role.
    Forbidden,
}

impl AuthRejection {
    fn from_guard(err: &AuthError, parts: &Parts) -> Self {
        match err {
            AuthError::Forbidden => Self::Forbidden,
            _ if is_api_request(parts) => Self::Unauthorized,
            _ => Self::RedirectToLogin,
        }
    }
}

/// Whether the request targets the JSON API.
///
/// Nested routers see their path with the prefix stripped, so this reads
/// the URI the request arrived with.
fn is_api_request(parts: &Parts) -> bool {
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |OriginalUri(uri)| uri.path());
    path == "/api" || path.starts_with("/api/")
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Authentication required").into_response()
            }
            Self::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions").into_response(),
        }
    }
}

fn identity(parts: &Parts) -> Option<&CurrentUser> {
    parts
        .extensions
        .get::<Identity>()
        .and_then(|identity| identity.0.as_ref())
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_authenticated(identity(parts))
            .map(|user| Self(user.clone()))
            .map_err(|e| AuthRejection::from_guard(&e, parts))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_admin(identity(parts))
            .map(|user| Self(user.clone()))
            .map_err(|e| AuthRejection::from_guard(&e, parts))
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(identity(parts).cloned()))
    }
}
