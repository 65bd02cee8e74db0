//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                     - Liveness check
//! GET  /health/ready               - Readiness check (store ping)
//!
//! # Auth
//! POST /register                   - Create account and sign in
//! POST /login                      - Sign in
//! POST /logout                     - Sign out
//! POST /forgot-password            - Request a reset link
//! GET  /reset-password?token=      - Check a reset link
//! POST /reset-password             - Set a new password
//!
//! # API (rate limited)
//! GET    /api/me                   - Current identity
//! POST   /api/warehouses           - Create warehouse (admin)
//! GET    /api/warehouses/{id}      - Capacity and committed units
//! PUT    /api/warehouses/{id}/capacity - Resize warehouse (admin)
//! DELETE /api/warehouses/{id}      - Delete empty warehouse (admin)
//! POST   /api/inventory            - Add units of a product
//! PUT    /api/inventory/{id}       - Replace a record's quantity
//! DELETE /api/inventory/{id}       - Delete a record
//! ```

pub mod api;
pub mod auth;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::warn;

use crate::middleware::{limit_api_requests, resolve_identity};
use crate::services::bounded;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route(
            "/reset-password",
            get(auth::reset_password_page).post(auth::reset_password),
        )
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(auth_routes())
        .nest("/api", api::routes())
}

/// Build the application with identity resolution and rate limiting.
///
/// The rate limit runs first so rejected requests never reach the store.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(from_fn_with_state(state.clone(), resolve_identity))
        .layer(from_fn_with_state(state.clone(), limit_api_requests))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match bounded(state.config().store_timeout, state.store().ping()).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, header},
        response::Response,
    };
    use depot_core::Role;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::config::{HashingConfig, RateLimitConfig, ServerConfig};
    use crate::services::{CounterStore, MemoryCounterStore};
    use crate::store::MemoryStore;

    fn config_with(rate_limit: RateLimitConfig) -> ServerConfig {
        let mut config = ServerConfig::in_memory(Url::parse("http://localhost:3000").unwrap());
        config.hashing = HashingConfig::minimal();
        config.rate_limit = rate_limit;
        config
    }

    fn state_with(rate_limit: RateLimitConfig) -> AppState {
        AppState::new(config_with(rate_limit), Arc::new(MemoryStore::new())).unwrap()
    }

    fn state() -> AppState {
        state_with(RateLimitConfig::default())
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn session_cookie_of(response: &Response) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_owned()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(state());

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_sets_cookie_and_me_resolves_it() {
        let app = app(state());

        let response = app
            .clone()
            .oneshot(form(
                "/register",
                "email=alice%40example.com&password=hunter22&confirm_password=hunter22",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
        let cookie = session_cookie_of(&response);

        let response = app
            .oneshot(
                Request::get("/api/me")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("alice@example.com"));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password_generically() {
        let state = state();
        state
            .auth()
            .create_account("bob@example.com", "correct-horse", Role::User)
            .await
            .unwrap();
        let app = app(state);

        let response = app
            .oneshot(form("/login", "email=bob%40example.com&password=wrong-horse"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "Invalid email or password");
    }

    #[tokio::test]
    async fn test_register_requires_both_fields() {
        let response = app(state())
            .oneshot(form("/register", "email=carol%40example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_requires_session() {
        let response = app(state())
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_warehouse_creation_requires_admin() {
        let app = app(state());
        let response = app
            .clone()
            .oneshot(form(
                "/register",
                "email=dave%40example.com&password=hunter22",
            ))
            .await
            .unwrap();
        let cookie = session_cookie_of(&response);

        let response = app
            .oneshot(
                Request::post("/api/warehouses")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"name":"North","location":"Oslo","capacity":10}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rate_limit_only_applies_to_api() {
        let app = app(state_with(RateLimitConfig {
            max_requests: 2,
            window: std::time::Duration::from_secs(60),
        }));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = app
            .clone()
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_instances_share_injected_counters() {
        let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let instance = || {
            let config = config_with(RateLimitConfig {
                max_requests: 2,
                window: std::time::Duration::from_secs(60),
            });
            let state = AppState::builder(config, Arc::new(MemoryStore::new()))
                .rate_limit_counters(counters.clone())
                .build()
                .unwrap();
            app(state)
        };
        let first = instance();
        let second = instance();

        for app in [&first, &second] {
            let response = app
                .clone()
                .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = first
            .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(counters.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_reset_page_redirects_unknown_token() {
        let response = app(state())
            .oneshot(
                Request::get("/reset-password?token=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/forgot-password");
    }
}
