//! Session cookie handling and identity resolution.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use crate::error::{AppError, set_sentry_user};
use crate::models::{CurrentUser, Session};
use crate::state::AppState;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "session";

/// The caller resolved from the session cookie, if any.
///
/// Inserted into request extensions by [`resolve_identity`].
#[derive(Debug, Clone, Default)]
pub struct Identity(pub Option<CurrentUser>);

/// Build the cookie that carries a freshly created session.
#[must_use]
pub fn session_cookie(session: &Session, secure: bool) -> Cookie<'static> {
    let max_age = (session.expires_at - session.created_at).num_seconds();

    Cookie::build((SESSION_COOKIE_NAME, session.id.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(max_age))
        .build()
}

/// Build a cookie that clears the session cookie in the browser.
#[must_use]
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();
    cookie.make_removal();
    cookie
}

/// Extract the session token from the request's `Cookie` headers.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
}

/// Middleware that resolves the session cookie into an [`Identity`].
///
/// Unknown or expired sessions resolve to an anonymous identity; only a
/// store failure fails the request.
///
/// # Errors
///
/// Returns `AppError::Auth` if the session store is unavailable.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(request.headers());
    let identity = state.sessions().resolve_identity(token.as_deref()).await?;

    if let Some(user) = &identity {
        set_sentry_user(&user.id);
    }
    request.extensions_mut().insert(Identity(identity));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use chrono::{TimeDelta, Utc};
    use depot_core::UserId;

    use super::*;
    use crate::models::OpaqueToken;

    #[test]
    fn test_session_cookie_attributes() {
        let now = Utc::now();
        let session = Session {
            id: OpaqueToken::generate(),
            user_id: UserId::new(1),
            expires_at: now + TimeDelta::days(30),
            created_at: now,
        };

        let cookie = session_cookie(&session, true).to_string();
        assert!(cookie.starts_with(&format!("session={}", session.id.as_str())));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=2592000"));

        assert!(!session_cookie(&session, false).to_string().contains("Secure"));
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let cookie = removal_cookie(false).to_string();
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_session_token_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        assert!(session_token(&HeaderMap::new()).is_none());
    }
}
