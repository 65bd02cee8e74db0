//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Rate limiting (`/api` paths only)
//! 4. Identity resolution (session cookie to [`Identity`])

pub mod auth;
pub mod rate_limit;
pub mod session;

pub use auth::{AuthRejection, OptionalAuth, RequireAdmin, RequireAuth};
pub use rate_limit::{client_address, limit_api_requests};
pub use session::{
    Identity, SESSION_COOKIE_NAME, removal_cookie, resolve_identity, session_cookie,
    session_token,
};
