//! In-process store.
//!
//! All state sits behind one `std::sync::Mutex` that is never held across an
//! await. Warehouse scopes additionally take a per-warehouse
//! `tokio::sync::Mutex`, work on a private copy of that warehouse's records,
//! and write the copy back on commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::{Email, InventoryRecordId, ProductId, Quantity, Role, UserId, WarehouseId};
use tokio::sync::OwnedMutexGuard;

use super::{
    InventoryStore, Redemption, ResetTokenStore, SessionStore, Store, UserStore, WarehouseScope,
};
use crate::db::RepositoryError;
use crate::models::{
    InventoryRecord, NewWarehouse, OpaqueToken, PasswordResetToken, Session, User, Warehouse,
};

struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, StoredUser>,
    sessions: HashMap<OpaqueToken, Session>,
    reset_tokens: HashMap<OpaqueToken, PasswordResetToken>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    records: HashMap<InventoryRecordId, InventoryRecord>,
    last_user_id: i32,
    last_warehouse_id: i32,
    last_record_id: i32,
}

impl MemoryState {
    fn user_by_email(&self, email: &Email) -> Option<&StoredUser> {
        self.users.values().find(|stored| &stored.user.email == email)
    }
}

fn next_id(last: &mut i32) -> i32 {
    *last += 1;
    *last
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemoryState>,
    warehouse_locks: Mutex<HashMap<WarehouseId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<WarehouseId, Arc<tokio::sync::Mutex<()>>>> {
        self.warehouse_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Store that keeps everything in process memory.
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.shared.state()
    }

    /// Number of live session rows, expired or not.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        email: &Email,
        password_hash: &str,
        role: Role,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state();
        if state.user_by_email(email).is_some() {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(next_id(&mut state.last_user_id)),
            email: email.clone(),
            role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_owned(),
            },
        );
        drop(state);
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state().users.get(&id).map(|stored| stored.user.clone()))
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self.state().user_by_email(email).map(|stored| stored.user.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .state()
            .user_by_email(email)
            .map(|stored| (stored.user.clone(), stored.password_hash.clone())))
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<User, RepositoryError> {
        let mut state = self.state();
        let stored = state.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        stored.user.role = role;
        stored.user.updated_at = Utc::now();
        Ok(stored.user.clone())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut state = self.state();
        if !state.users.contains_key(&session.user_id) {
            return Err(RepositoryError::NotFound);
        }
        state.sessions.insert(session.id.clone(), session.clone());
        drop(state);
        Ok(())
    }

    async fn find_session(
        &self,
        id: &OpaqueToken,
    ) -> Result<Option<(Session, User)>, RepositoryError> {
        let state = self.state();
        Ok(state.sessions.get(id).and_then(|session| {
            state
                .users
                .get(&session.user_id)
                .map(|stored| (session.clone(), stored.user.clone()))
        }))
    }

    async fn delete_session(&self, id: &OpaqueToken) -> Result<bool, RepositoryError> {
        Ok(self.state().sessions.remove(id).is_some())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.state();
        let before = state.sessions.len();
        state.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), RepositoryError> {
        let mut state = self.state();
        if !state.users.contains_key(&token.user_id) {
            return Err(RepositoryError::NotFound);
        }
        state.reset_tokens.insert(token.token.clone(), token.clone());
        drop(state);
        Ok(())
    }

    async fn find_reset_token(
        &self,
        token: &OpaqueToken,
    ) -> Result<Option<(PasswordResetToken, User)>, RepositoryError> {
        let state = self.state();
        Ok(state.reset_tokens.get(token).and_then(|record| {
            state
                .users
                .get(&record.user_id)
                .map(|stored| (record.clone(), stored.user.clone()))
        }))
    }

    async fn redeem_reset_token(
        &self,
        token: &OpaqueToken,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, RepositoryError> {
        let mut state = self.state();

        let Some(record) = state.reset_tokens.get_mut(token) else {
            return Ok(Redemption::Rejected);
        };
        if record.is_used() || record.is_expired_at(now) {
            return Ok(Redemption::Rejected);
        }
        record.used_at = Some(now);
        let user_id = record.user_id;

        let stored = state.users.get_mut(&user_id).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("reset token owner {user_id} missing"))
        })?;
        password_hash.clone_into(&mut stored.password_hash);
        stored.user.updated_at = now;

        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.user_id != user_id);
        let sessions_revoked = (before - state.sessions.len()) as u64;
        drop(state);

        Ok(Redemption::Redeemed {
            user_id,
            sessions_revoked,
        })
    }

    async fn delete_stale_reset_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state();
        let before = state.reset_tokens.len();
        state
            .reset_tokens
            .retain(|_, token| !token.is_used() && !token.is_expired_at(now));
        Ok((before - state.reset_tokens.len()) as u64)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn create_warehouse(&self, new: &NewWarehouse) -> Result<Warehouse, RepositoryError> {
        let mut state = self.state();
        let warehouse = Warehouse {
            id: WarehouseId::new(next_id(&mut state.last_warehouse_id)),
            name: new.name.clone(),
            location: new.location.clone(),
            capacity: new.capacity,
            created_at: Utc::now(),
        };
        state.warehouses.insert(warehouse.id, warehouse.clone());
        drop(state);
        Ok(warehouse)
    }

    async fn find_record(
        &self,
        id: InventoryRecordId,
    ) -> Result<Option<InventoryRecord>, RepositoryError> {
        Ok(self.state().records.get(&id).cloned())
    }

    async fn lock_warehouse(
        &self,
        id: WarehouseId,
    ) -> Result<Option<Box<dyn WarehouseScope>>, RepositoryError> {
        // Only live warehouses get a lock entry.
        if !self.state().warehouses.contains_key(&id) {
            return Ok(None);
        }
        let lock = Arc::clone(self.shared.locks().entry(id).or_default());
        let guard = lock.lock_owned().await;

        // The warehouse may have been deleted while we waited for the lock.
        let snapshot = {
            let state = self.state();
            state.warehouses.get(&id).cloned().map(|warehouse| {
                let records = state
                    .records
                    .values()
                    .filter(|record| record.warehouse_id == id)
                    .map(|record| (record.id, record.clone()))
                    .collect::<HashMap<_, _>>();
                (warehouse, records)
            })
        };

        let Some((warehouse, records)) = snapshot else {
            self.shared.locks().remove(&id);
            return Ok(None);
        };
        Ok(Some(Box::new(MemoryScope {
            shared: Arc::clone(&self.shared),
            _guard: guard,
            warehouse,
            records,
            deleted: false,
        }) as Box<dyn WarehouseScope>))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct MemoryScope {
    shared: Arc<Shared>,
    _guard: OwnedMutexGuard<()>,
    warehouse: Warehouse,
    records: HashMap<InventoryRecordId, InventoryRecord>,
    deleted: bool,
}

impl MemoryScope {
    fn ensure_live(&self) -> Result<(), RepositoryError> {
        if self.deleted {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl WarehouseScope for MemoryScope {
    fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    async fn committed_total(
        &mut self,
        excluding: Option<InventoryRecordId>,
    ) -> Result<u64, RepositoryError> {
        Ok(self
            .records
            .values()
            .filter(|record| Some(record.id) != excluding)
            .map(|record| record.quantity.as_u64())
            .sum())
    }

    async fn record_count(&mut self) -> Result<u64, RepositoryError> {
        Ok(self.records.len() as u64)
    }

    async fn record(
        &mut self,
        id: InventoryRecordId,
    ) -> Result<Option<InventoryRecord>, RepositoryError> {
        Ok(self.records.get(&id).cloned())
    }

    async fn add_units(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, RepositoryError> {
        self.ensure_live()?;
        let now = Utc::now();

        if let Some(existing) = self
            .records
            .values_mut()
            .find(|record| record.product_id == product_id)
        {
            existing.quantity = existing
                .quantity
                .checked_add(quantity)
                .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = InventoryRecordId::new(next_id(&mut self.shared.state().last_record_id));
        let record = InventoryRecord {
            id,
            warehouse_id: self.warehouse.id,
            product_id,
            quantity,
            updated_at: now,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn set_record_quantity(
        &mut self,
        id: InventoryRecordId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, RepositoryError> {
        self.ensure_live()?;
        let record = self.records.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.quantity = quantity;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_record(&mut self, id: InventoryRecordId) -> Result<bool, RepositoryError> {
        self.ensure_live()?;
        Ok(self.records.remove(&id).is_some())
    }

    async fn set_capacity(&mut self, capacity: Quantity) -> Result<Warehouse, RepositoryError> {
        self.ensure_live()?;
        self.warehouse.capacity = capacity;
        Ok(self.warehouse.clone())
    }

    async fn delete_warehouse(&mut self) -> Result<(), RepositoryError> {
        self.ensure_live()?;
        if !self.records.is_empty() {
            return Err(RepositoryError::Conflict(
                "warehouse still holds inventory".to_owned(),
            ));
        }
        self.deleted = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self {
            shared,
            _guard,
            warehouse,
            records,
            deleted,
        } = *self;
        let id = warehouse.id;
        let mut state = shared.state();

        state.records.retain(|_, record| record.warehouse_id != id);
        if deleted {
            state.warehouses.remove(&id);
        } else {
            state.records.extend(records);
            state.warehouses.insert(id, warehouse);
        }
        drop(state);
        if deleted {
            shared.locks().remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn quantity(n: i64) -> Quantity {
        Quantity::try_from(n).unwrap()
    }

    async fn warehouse(store: &MemoryStore, capacity: i64) -> Warehouse {
        store
            .create_warehouse(&NewWarehouse {
                name: "Main".to_owned(),
                location: "Dock 1".to_owned(),
                capacity: quantity(capacity),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let email = Email::parse("a@x.com").unwrap();
        store.create_user(&email, "h", Role::User).await.unwrap();

        let err = store.create_user(&email, "h", Role::User).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_uncommitted_scope_is_discarded() {
        let store = MemoryStore::new();
        let w = warehouse(&store, 10).await;

        let mut scope = store.lock_warehouse(w.id).await.unwrap().unwrap();
        scope.add_units(ProductId::new(1), quantity(4)).await.unwrap();
        drop(scope);

        let mut scope = store.lock_warehouse(w.id).await.unwrap().unwrap();
        assert_eq!(scope.committed_total(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_units_merges_same_product() {
        let store = MemoryStore::new();
        let w = warehouse(&store, 10).await;

        let mut scope = store.lock_warehouse(w.id).await.unwrap().unwrap();
        let first = scope.add_units(ProductId::new(1), quantity(2)).await.unwrap();
        let second = scope.add_units(ProductId::new(1), quantity(3)).await.unwrap();
        scope.commit().await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, quantity(5));
        let stored = store.find_record(first.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, quantity(5));
    }

    #[tokio::test]
    async fn test_deleted_warehouse_cannot_be_locked() {
        let store = MemoryStore::new();
        let w = warehouse(&store, 10).await;

        let mut scope = store.lock_warehouse(w.id).await.unwrap().unwrap();
        scope.delete_warehouse().await.unwrap();
        scope.commit().await.unwrap();

        assert!(store.lock_warehouse(w.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_table_tracks_only_live_warehouses() {
        let store = MemoryStore::new();
        for id in 1000..1100 {
            assert!(store.lock_warehouse(WarehouseId::new(id)).await.unwrap().is_none());
        }
        assert!(store.shared.locks().is_empty());

        let w = warehouse(&store, 10).await;
        store.lock_warehouse(w.id).await.unwrap().unwrap().commit().await.unwrap();
        assert_eq!(store.shared.locks().len(), 1);

        let mut scope = store.lock_warehouse(w.id).await.unwrap().unwrap();
        scope.delete_warehouse().await.unwrap();
        scope.commit().await.unwrap();
        assert!(store.shared.locks().is_empty());
    }

    #[tokio::test]
    async fn test_redeem_claims_token_once() {
        let store = MemoryStore::new();
        let email = Email::parse("a@x.com").unwrap();
        let user = store.create_user(&email, "old", Role::User).await.unwrap();
        let now = Utc::now();
        let token = PasswordResetToken {
            token: OpaqueToken::generate(),
            user_id: user.id,
            expires_at: now + chrono::Duration::hours(1),
            used_at: None,
            created_at: now,
        };
        store.insert_reset_token(&token).await.unwrap();

        let first = store.redeem_reset_token(&token.token, "new", now).await.unwrap();
        let second = store.redeem_reset_token(&token.token, "newer", now).await.unwrap();

        assert!(matches!(first, Redemption::Redeemed { .. }));
        assert_eq!(second, Redemption::Rejected);
        let (_, hash) = store.get_password_hash(&email).await.unwrap().unwrap();
        assert_eq!(hash, "new");
    }
}
