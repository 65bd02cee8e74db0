//! Authentication route handlers.
//!
//! Handles registration, login, logout and the password-reset flow. Form
//! fields are optional at the type level so that a missing field produces
//! the same 400 message as an empty one.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, removal_cookie, session_cookie, session_token};
use crate::models::User;
use crate::services::{AuthError, MIN_PASSWORD_LENGTH, RedeemOutcome, TokenState};
use crate::state::AppState;

/// Where authenticated users land.
const HOME_PATH: &str = "/dashboard";

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "confirmPassword")]
    pub confirm_password: Option<String>,
}

/// Forgot password form data.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: Option<String>,
}

/// Reset password form data.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub token: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "confirmPassword")]
    pub confirm_password: Option<String>,
}

/// Query parameters of the reset link.
#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub token: Option<String>,
}

/// Body returned for a reset link that can still be redeemed.
#[derive(Debug, Serialize)]
pub struct ResetForm {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Treat missing and blank form fields alike.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

/// Signed-in users have no business on the guest pages.
fn redirect_signed_in(auth: &OptionalAuth) -> Option<Response> {
    auth.0
        .as_ref()
        .map(|_| Redirect::to(HOME_PATH).into_response())
}

/// Start a session for `user` and send them home with the cookie set.
async fn sign_in(state: &AppState, user: &User) -> Result<Response> {
    let session = state.sessions().create_session(user.id).await?;
    let cookie = session_cookie(&session, state.config().secure_cookies());

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
        Redirect::to(HOME_PATH),
    )
        .into_response())
}

// =============================================================================
// Registration & Login
// =============================================================================

/// Handle registration form submission.
pub async fn register(
    State(state): State<AppState>,
    auth: OptionalAuth,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    if let Some(redirect) = redirect_signed_in(&auth) {
        return Ok(redirect);
    }

    let (Some(email), Some(password)) = (present(form.email), present(form.password)) else {
        return Err(AppError::BadRequest("Invalid email or password".to_owned()));
    };
    if form.confirm_password.is_some_and(|confirm| confirm != password) {
        return Err(AppError::BadRequest("Passwords do not match".to_owned()));
    }

    let user = state.auth().register(&email, &password).await?;
    sign_in(&state, &user).await
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    auth: OptionalAuth,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if let Some(redirect) = redirect_signed_in(&auth) {
        return Ok(redirect);
    }

    let (Some(email), Some(password)) = (present(form.email), present(form.password)) else {
        return Err(AppError::BadRequest("Invalid email or password".to_owned()));
    };

    let user = state.auth().login(&email, &password).await?;
    sign_in(&state, &user).await
}

/// Handle logout.
///
/// Deletes the server-side session, if any, and clears the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(token) = session_token(&headers) {
        state.sessions().invalidate_session(&token).await?;
    }
    let cookie = removal_cookie(state.config().secure_cookies());

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
        Redirect::to("/login"),
    )
        .into_response())
}

// =============================================================================
// Password Reset
// =============================================================================

/// Handle forgot password form submission.
///
/// The response is the same whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    auth: OptionalAuth,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Response> {
    if let Some(redirect) = redirect_signed_in(&auth) {
        return Ok(redirect);
    }

    let Some(email) = present(form.email) else {
        return Err(AuthError::InvalidEmail(depot_core::EmailError::Empty).into());
    };

    let request = state.resets().request_reset(&email).await?;
    let message = request.message();
    if let Some(delivery) = request.into_delivery() {
        state.reset_links().deliver(delivery);
    }

    Ok((StatusCode::OK, message).into_response())
}

/// Display the reset form for a reset link.
///
/// Validation does not consume the token. Links that cannot be redeemed
/// send the user back to request a new one.
pub async fn reset_password_page(
    State(state): State<AppState>,
    auth: OptionalAuth,
    Query(query): Query<ResetQuery>,
) -> Result<Response> {
    if let Some(redirect) = redirect_signed_in(&auth) {
        return Ok(redirect);
    }

    let Some(token) = present(query.token) else {
        return Ok(Redirect::to("/forgot-password").into_response());
    };

    match state.resets().validate(&token).await? {
        TokenState::Valid(reset) => Ok(Json(ResetForm {
            token,
            expires_at: reset.expires_at,
        })
        .into_response()),
        TokenState::InvalidOrExpired | TokenState::AlreadyUsed => {
            debug!("reset link no longer redeemable");
            Ok(Redirect::to("/forgot-password").into_response())
        }
    }
}

/// Handle reset password form submission.
pub async fn reset_password(
    State(state): State<AppState>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response> {
    let (Some(token), Some(password), Some(confirm)) = (
        present(form.token),
        present(form.password),
        present(form.confirm_password),
    ) else {
        return Err(AppError::BadRequest("Invalid request".to_owned()));
    };

    if password != confirm {
        return Err(AppError::BadRequest("Passwords do not match".to_owned()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }

    match state.resets().redeem(&token, &password).await? {
        RedeemOutcome::PasswordReset { .. } => {
            Ok((StatusCode::OK, "Password has been reset successfully").into_response())
        }
        RedeemOutcome::InvalidOrExpired => Err(AppError::ResetTokenInvalid),
        RedeemOutcome::AlreadyUsed => {
            warn!("redeem attempted with a used reset token");
            Err(AppError::ResetTokenUsed)
        }
    }
}
