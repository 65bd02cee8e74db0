//! The caller's own identity.

use axum::Json;

use crate::middleware::RequireAuth;
use crate::models::CurrentUser;

/// Return the authenticated caller.
pub async fn show(RequireAuth(user): RequireAuth) -> Json<CurrentUser> {
    Json(user)
}
