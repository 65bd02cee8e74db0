//! Sessions and the identity they resolve to.

use chrono::{DateTime, Utc};
use depot_core::{Email, Role, UserId};
use serde::Serialize;

use super::{OpaqueToken, User};

/// A server-side session record.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bearer token carried in the session cookie.
    pub id: OpaqueToken,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A session is expired once `expires_at` is strictly in the past.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// The authenticated caller attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}
