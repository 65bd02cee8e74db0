//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side failures to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::{AuthError, InventoryError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication or authorization failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Inventory or warehouse operation failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// The reset token is unknown or past its expiry.
    #[error("Invalid or expired reset token")]
    ResetTokenInvalid,

    /// The reset token has already been redeemed.
    #[error("This reset link has already been used")]
    ResetTokenUsed,

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Too many requests")]
    RateLimited,
}

impl AppError {
    /// Whether this error is the server's fault and belongs in Sentry.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Auth(AuthError::StoreUnavailable(_) | AuthError::PasswordHash)
                | Self::Inventory(InventoryError::StoreUnavailable(_))
        )
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) => match err {
                AuthError::Unauthenticated | AuthError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::Forbidden => StatusCode::FORBIDDEN,
                AuthError::DuplicateEmail => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::StoreUnavailable(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Inventory(err) => match err {
                InventoryError::CapacityExceeded { .. }
                | InventoryError::CapacityBelowCommitted { .. }
                | InventoryError::WarehouseNotEmpty { .. } => StatusCode::CONFLICT,
                InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
                InventoryError::Validation(_) => StatusCode::BAD_REQUEST,
                InventoryError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::ResetTokenInvalid | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ResetTokenUsed => StatusCode::GONE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        // Don't expose internal error details to clients
        if self.is_server_error() {
            return "Internal server error".to_string();
        }

        match self {
            Self::Auth(err) => match err {
                AuthError::Unauthenticated => "Authentication required".to_string(),
                AuthError::Forbidden => "Insufficient permissions".to_string(),
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::DuplicateEmail => "Email already exists".to_string(),
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Please enter a valid email address".to_string(),
                AuthError::UserNotFound => "User not found".to_string(),
                AuthError::StoreUnavailable(_) | AuthError::PasswordHash => {
                    "Authentication error".to_string()
                }
            },
            Self::Inventory(InventoryError::NotFound(what)) => {
                let mut message = format!("{what} not found");
                if let Some(first) = message.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                message
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), self.client_message()).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the authenticated caller.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
