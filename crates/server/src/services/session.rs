//! Server-side sessions.
//!
//! A session id is an [`OpaqueToken`]; the cookie carries it and the store
//! is keyed by it. Expiry is enforced lazily: an expired session found on
//! lookup is deleted and treated as absent. The rest are reclaimed by
//! [`SessionManager::purge_expired`], which `depot-cli prune` runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use depot_core::UserId;
use tracing::{debug, info, instrument, warn};

use super::{AuthError, bounded};
use crate::models::{CurrentUser, OpaqueToken, Session};
use crate::store::SessionStore;

/// How long a session stays valid after creation.
pub const SESSION_TTL: TimeDelta = TimeDelta::days(30);

/// Issues, resolves and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: TimeDelta,
    timeout: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self {
            store,
            ttl: SESSION_TTL,
            timeout,
        }
    }

    /// Override the session lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Create and persist a session for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the session cannot be stored.
    #[instrument(skip(self))]
    pub async fn create_session(&self, user_id: UserId) -> Result<Session, AuthError> {
        let now = Utc::now();
        let session = Session {
            id: OpaqueToken::generate(),
            user_id,
            expires_at: now + self.ttl,
            created_at: now,
        };

        bounded(self.timeout, self.store.insert_session(&session)).await?;

        info!(%user_id, expires_at = %session.expires_at, "session created");
        Ok(session)
    }

    /// Look up a session presented by a client.
    ///
    /// Returns `None` for unknown, malformed or expired ids. An expired
    /// session is deleted as a side effect.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the lookup fails.
    pub async fn get_session(
        &self,
        id: &str,
    ) -> Result<Option<(Session, CurrentUser)>, AuthError> {
        let Some(token) = OpaqueToken::from_client(id) else {
            return Ok(None);
        };

        let Some((session, user)) = bounded(self.timeout, self.store.find_session(&token)).await?
        else {
            return Ok(None);
        };

        if session.is_expired_at(Utc::now()) {
            debug!(user_id = %session.user_id, "expired session presented");
            if let Err(e) = bounded(self.timeout, self.store.delete_session(&token)).await {
                warn!(error = %e, "failed to delete expired session");
            }
            return Ok(None);
        }

        Ok(Some((session, user.into())))
    }

    /// Resolve the caller from an optional session cookie value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the lookup fails.
    pub async fn resolve_identity(
        &self,
        cookie: Option<&str>,
    ) -> Result<Option<CurrentUser>, AuthError> {
        match cookie {
            Some(id) => Ok(self.get_session(id).await?.map(|(_, user)| user)),
            None => Ok(None),
        }
    }

    /// Delete a session. Unknown ids are not an error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the delete fails.
    pub async fn invalidate_session(&self, id: &str) -> Result<(), AuthError> {
        let Some(token) = OpaqueToken::from_client(id) else {
            return Ok(());
        };

        if bounded(self.timeout, self.store.delete_session(&token)).await? {
            debug!("session invalidated");
        }
        Ok(())
    }

    /// Delete all sessions that have expired.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let removed = bounded(self.timeout, self.store.delete_expired_sessions(Utc::now())).await?;
        if removed > 0 {
            info!(removed, "expired sessions purged");
        }
        Ok(removed)
    }
}

/// Require an authenticated caller.
///
/// # Errors
///
/// Returns `AuthError::Unauthenticated` when there is no identity.
pub const fn require_authenticated(
    identity: Option<&CurrentUser>,
) -> Result<&CurrentUser, AuthError> {
    match identity {
        Some(user) => Ok(user),
        None => Err(AuthError::Unauthenticated),
    }
}

/// Require an authenticated caller with the admin role.
///
/// # Errors
///
/// Returns `AuthError::Unauthenticated` when there is no identity and
/// `AuthError::Forbidden` when the caller is not an admin.
pub const fn require_admin(identity: Option<&CurrentUser>) -> Result<&CurrentUser, AuthError> {
    match identity {
        Some(user) if user.is_admin() => Ok(user),
        Some(_) => Err(AuthError::Forbidden),
        None => Err(AuthError::Unauthenticated),
    }
}
