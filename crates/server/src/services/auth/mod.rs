//! Authentication service.
//!
//! Provides password registration and login. Sessions are issued separately
//! by [`crate::services::SessionManager`].

mod error;

pub use error::AuthError;

use std::sync::Arc;
use std::time::Duration;

use depot_core::{Email, Role};
use tracing::{info, instrument};

use super::bounded;
use super::password::{PasswordHasher, validate_password};
use crate::db::RepositoryError;
use crate::models::User;
use crate::store::UserStore;

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    timeout: Duration,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher, timeout: Duration) -> Self {
        Self {
            users,
            hasher,
            timeout,
        }
    }

    /// Register a new user with email and password.
    ///
    /// New accounts always get [`Role::User`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::DuplicateEmail` if the email is already registered.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.create_account(email, password, Role::User).await
    }

    /// Create an account with an explicit role. Used by operator tooling.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    #[instrument(skip(self, email, password))]
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let password_hash = self.hasher.hash(password)?;

        let user = bounded(
            self.timeout,
            self.users.create_user(&email, &password_hash, role),
        )
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::DuplicateEmail,
            other => AuthError::StoreUnavailable(other),
        })?;

        info!(user_id = %user.id, role = %user.role, "account created");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = bounded(self.timeout, self.users.get_password_hash(&email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.hasher.verify(password, &password_hash)?;

        Ok(user)
    }

    /// Change the role of the account registered under `email`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no such account exists.
    pub async fn set_role(&self, email: &str, role: Role) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let user = bounded(self.timeout, self.users.get_user_by_email(&email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let user = bounded(self.timeout, self.users.set_role(user.id, role))
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::StoreUnavailable(other),
            })?;

        info!(user_id = %user.id, role = %user.role, "role changed");
        Ok(user)
    }
}
