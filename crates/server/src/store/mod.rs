//! Storage seams.
//!
//! The services never talk to Postgres directly; they hold trait objects
//! for the narrow slice of storage they need. [`crate::db::PgStore`] is the
//! production implementation and [`memory::MemoryStore`] backs tests and
//! local development.
//!
//! Every read-check-write sequence that guards an invariant goes through a
//! single store call (`redeem_reset_token`) or a [`WarehouseScope`], so the
//! check and the write see the same state.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::{Email, InventoryRecordId, ProductId, Quantity, Role, UserId, WarehouseId};

use crate::db::RepositoryError;
use crate::models::{
    InventoryRecord, NewWarehouse, OpaqueToken, PasswordResetToken, Session, User, Warehouse,
};

pub use memory::MemoryStore;

/// Account storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is already taken.
    async fn create_user(
        &self,
        email: &Email,
        password_hash: &str,
        role: Role,
    ) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Look up a user together with their stored password hash.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    async fn set_role(&self, id: UserId, role: Role) -> Result<User, RepositoryError>;
}

/// Session storage, keyed by the session token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), RepositoryError>;

    /// Fetch a session and its owner. Expiry is not checked here.
    async fn find_session(
        &self,
        id: &OpaqueToken,
    ) -> Result<Option<(Session, User)>, RepositoryError>;

    /// Remove a session. Returns whether a row was removed.
    async fn delete_session(&self, id: &OpaqueToken) -> Result<bool, RepositoryError>;

    /// Remove every session whose expiry is before `now`.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Result of an atomic reset-token redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// The token was claimed, the password replaced, and the owner's
    /// sessions removed, all in one unit.
    Redeemed { user_id: UserId, sessions_revoked: u64 },
    /// The token was unknown, already used, or expired at `now`. Nothing
    /// was written.
    Rejected,
}

/// Password-reset token storage.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), RepositoryError>;

    async fn find_reset_token(
        &self,
        token: &OpaqueToken,
    ) -> Result<Option<(PasswordResetToken, User)>, RepositoryError>;

    /// Claim `token` and set the owner's password hash.
    ///
    /// The claim succeeds only if the token is unused and `expires_at >= now`.
    /// Of any number of concurrent calls for the same token, at most one
    /// returns [`Redemption::Redeemed`].
    async fn redeem_reset_token(
        &self,
        token: &OpaqueToken,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, RepositoryError>;

    /// Remove tokens that are used or expired before `now`.
    async fn delete_stale_reset_tokens(&self, now: DateTime<Utc>)
    -> Result<u64, RepositoryError>;
}

/// Warehouse and inventory storage.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn create_warehouse(&self, new: &NewWarehouse) -> Result<Warehouse, RepositoryError>;

    async fn find_record(
        &self,
        id: InventoryRecordId,
    ) -> Result<Option<InventoryRecord>, RepositoryError>;

    /// Open an exclusive unit of work on one warehouse.
    ///
    /// While the returned scope is alive no other scope can be opened on the
    /// same warehouse. Returns `None` if the warehouse does not exist.
    async fn lock_warehouse(
        &self,
        id: WarehouseId,
    ) -> Result<Option<Box<dyn WarehouseScope>>, RepositoryError>;
}

/// Exclusive unit of work on a single warehouse and its records.
///
/// Writes become visible only on [`WarehouseScope::commit`]. Dropping the
/// scope without committing discards them.
#[async_trait]
pub trait WarehouseScope: Send {
    /// The warehouse as read when the scope was opened.
    fn warehouse(&self) -> &Warehouse;

    /// Sum of quantities in this warehouse, optionally leaving one record out.
    async fn committed_total(
        &mut self,
        excluding: Option<InventoryRecordId>,
    ) -> Result<u64, RepositoryError>;

    async fn record_count(&mut self) -> Result<u64, RepositoryError>;

    /// Fetch a record if it belongs to this warehouse.
    async fn record(
        &mut self,
        id: InventoryRecordId,
    ) -> Result<Option<InventoryRecord>, RepositoryError>;

    /// Add `quantity` units of `product_id`, creating the record if needed.
    async fn add_units(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, RepositoryError>;

    /// Overwrite a record's quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record is not in this warehouse.
    async fn set_record_quantity(
        &mut self,
        id: InventoryRecordId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, RepositoryError>;

    /// Remove a record. Returns whether it existed.
    async fn delete_record(&mut self, id: InventoryRecordId) -> Result<bool, RepositoryError>;

    async fn set_capacity(&mut self, capacity: Quantity) -> Result<Warehouse, RepositoryError>;

    async fn delete_warehouse(&mut self) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Everything the server needs from a backing store.
#[async_trait]
pub trait Store:
    UserStore + SessionStore + ResetTokenStore + InventoryStore + 'static
{
    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
