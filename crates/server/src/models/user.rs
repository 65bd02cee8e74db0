//! User accounts.

use chrono::{DateTime, Utc};
use depot_core::{Email, Role, UserId};
use serde::Serialize;

/// A registered account.
///
/// The password hash is deliberately not a field; it is only ever read
/// through [`crate::store::UserStore::get_password_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
