//! Password-reset tokens.

use chrono::{DateTime, Utc};
use depot_core::UserId;

use super::OpaqueToken;

/// A single-use, time-limited password-reset token.
#[derive(Debug, Clone)]
pub struct PasswordResetToken {
    pub token: OpaqueToken,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    /// Set exactly once, when the token is redeemed.
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    #[must_use]
    pub const fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}
