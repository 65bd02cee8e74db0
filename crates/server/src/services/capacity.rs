//! Warehouse capacity enforcement.
//!
//! For every warehouse the sum of its record quantities never exceeds its
//! capacity. Each mutating operation opens a [`WarehouseScope`], checks the
//! invariant against the state inside the scope, writes, and commits. A
//! rejected or timed-out operation drops its scope, so nothing it wrote is
//! kept.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use depot_core::{InventoryRecordId, ProductId, Quantity, WarehouseId};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::bounded;
use crate::db::RepositoryError;
use crate::models::{InventoryRecord, NewWarehouse, Warehouse, WarehouseUsage};
use crate::store::{InventoryStore, WarehouseScope};

/// Errors from inventory and warehouse operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The write would push the warehouse past its capacity.
    #[error(
        "capacity exceeded: warehouse {warehouse_id} holds {committed} of {capacity}, \
         {requested} more requested"
    )]
    CapacityExceeded {
        warehouse_id: WarehouseId,
        capacity: Quantity,
        committed: u64,
        requested: u64,
    },

    /// The new capacity is below what the warehouse already holds.
    #[error("capacity {requested} is below the {committed} units already stored")]
    CapacityBelowCommitted { requested: Quantity, committed: u64 },

    /// The warehouse still has inventory records.
    #[error("warehouse {warehouse_id} still holds {records} inventory records")]
    WarehouseNotEmpty {
        warehouse_id: WarehouseId,
        records: u64,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The store failed or timed out.
    #[error("store unavailable: {0}")]
    StoreUnavailable(RepositoryError),
}

impl From<RepositoryError> for InventoryError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("inventory record"),
            other => Self::StoreUnavailable(other),
        }
    }
}

/// Guards the capacity invariant for every inventory and warehouse write.
#[derive(Clone)]
pub struct CapacityGuard {
    store: Arc<dyn InventoryStore>,
    timeout: Duration,
}

impl CapacityGuard {
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Run a whole unit of work under the store deadline.
    async fn within_deadline<T, F>(&self, work: F) -> Result<T, InventoryError>
    where
        F: Future<Output = Result<T, InventoryError>>,
    {
        tokio::time::timeout(self.timeout, work)
            .await
            .unwrap_or(Err(InventoryError::StoreUnavailable(RepositoryError::Timeout)))
    }

    async fn lock(&self, id: WarehouseId) -> Result<Box<dyn WarehouseScope>, InventoryError> {
        self.store
            .lock_warehouse(id)
            .await
            .map_err(InventoryError::StoreUnavailable)?
            .ok_or(InventoryError::NotFound("warehouse"))
    }

    async fn record(&self, id: InventoryRecordId) -> Result<InventoryRecord, InventoryError> {
        bounded(self.timeout, self.store.find_record(id))
            .await
            .map_err(InventoryError::StoreUnavailable)?
            .ok_or(InventoryError::NotFound("inventory record"))
    }

    /// Create a warehouse.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Validation` for a blank name or location.
    #[instrument(skip(self))]
    pub async fn create_warehouse(
        &self,
        name: &str,
        location: &str,
        capacity: Quantity,
    ) -> Result<Warehouse, InventoryError> {
        let name = name.trim();
        let location = location.trim();
        if name.is_empty() || location.is_empty() {
            return Err(InventoryError::Validation(
                "name and location are required".to_owned(),
            ));
        }

        let warehouse = bounded(
            self.timeout,
            self.store.create_warehouse(&NewWarehouse {
                name: name.to_owned(),
                location: location.to_owned(),
                capacity,
            }),
        )
        .await
        .map_err(InventoryError::StoreUnavailable)?;

        info!(warehouse_id = %warehouse.id, %capacity, "warehouse created");
        Ok(warehouse)
    }

    /// Capacity and committed units of a warehouse.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` if the warehouse does not exist.
    pub async fn usage(&self, warehouse_id: WarehouseId) -> Result<WarehouseUsage, InventoryError> {
        self.within_deadline(async {
            let mut scope = self.lock(warehouse_id).await?;
            let committed = scope.committed_total(None).await?;
            Ok(WarehouseUsage {
                warehouse_id,
                capacity: scope.warehouse().capacity,
                committed,
            })
        })
        .await
    }

    /// Add `quantity` units of a product to a warehouse.
    ///
    /// If the warehouse already has a record for the product the units are
    /// added to it; otherwise a record is created.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::CapacityExceeded` if the warehouse cannot
    /// take the units and `InventoryError::NotFound` if it does not exist.
    #[instrument(skip(self))]
    pub async fn upsert_inventory(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, InventoryError> {
        self.within_deadline(async {
            let mut scope = self.lock(warehouse_id).await?;
            let capacity = scope.warehouse().capacity;
            let committed = scope.committed_total(None).await?;
            ensure_fits(warehouse_id, capacity, committed, quantity)?;

            let record = scope.add_units(product_id, quantity).await?;
            scope.commit().await?;

            info!(record_id = %record.id, total = %record.quantity, "inventory added");
            Ok(record)
        })
        .await
    }

    /// Replace the quantity of an existing record.
    ///
    /// The record's current quantity does not count against the capacity,
    /// only the other records in its warehouse do.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::CapacityExceeded` if the new quantity does
    /// not fit and `InventoryError::NotFound` if the record does not exist.
    #[instrument(skip(self))]
    pub async fn update_inventory_quantity(
        &self,
        record_id: InventoryRecordId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, InventoryError> {
        self.within_deadline(async {
            let warehouse_id = self.record(record_id).await?.warehouse_id;
            let mut scope = self.lock(warehouse_id).await?;
            if scope.record(record_id).await?.is_none() {
                return Err(InventoryError::NotFound("inventory record"));
            }

            let capacity = scope.warehouse().capacity;
            let others = scope.committed_total(Some(record_id)).await?;
            ensure_fits(warehouse_id, capacity, others, quantity)?;

            let record = scope.set_record_quantity(record_id, quantity).await?;
            scope.commit().await?;

            info!(%record_id, %quantity, "inventory quantity set");
            Ok(record)
        })
        .await
    }

    /// Remove an inventory record.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` if the record does not exist.
    #[instrument(skip(self))]
    pub async fn delete_inventory(&self, record_id: InventoryRecordId) -> Result<(), InventoryError> {
        self.within_deadline(async {
            let warehouse_id = self.record(record_id).await?.warehouse_id;
            let mut scope = self.lock(warehouse_id).await?;
            if !scope.delete_record(record_id).await? {
                return Err(InventoryError::NotFound("inventory record"));
            }
            scope.commit().await?;

            info!(%record_id, "inventory record deleted");
            Ok(())
        })
        .await
    }

    /// Change a warehouse's capacity.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::CapacityBelowCommitted` if the warehouse
    /// already holds more than `capacity` units.
    #[instrument(skip(self))]
    pub async fn resize_warehouse(
        &self,
        warehouse_id: WarehouseId,
        capacity: Quantity,
    ) -> Result<Warehouse, InventoryError> {
        self.within_deadline(async {
            let mut scope = self.lock(warehouse_id).await?;
            let committed = scope.committed_total(None).await?;
            if capacity.as_u64() < committed {
                warn!(%warehouse_id, %capacity, committed, "resize below committed units rejected");
                return Err(InventoryError::CapacityBelowCommitted {
                    requested: capacity,
                    committed,
                });
            }

            let warehouse = scope.set_capacity(capacity).await?;
            scope.commit().await?;

            info!(%warehouse_id, %capacity, "warehouse resized");
            Ok(warehouse)
        })
        .await
    }

    /// Delete an empty warehouse.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::WarehouseNotEmpty` if any record remains.
    #[instrument(skip(self))]
    pub async fn delete_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), InventoryError> {
        self.within_deadline(async {
            let mut scope = self.lock(warehouse_id).await?;
            let records = scope.record_count().await?;
            if records > 0 {
                return Err(InventoryError::WarehouseNotEmpty {
                    warehouse_id,
                    records,
                });
            }

            scope.delete_warehouse().await?;
            scope.commit().await?;

            info!(%warehouse_id, "warehouse deleted");
            Ok(())
        })
        .await
    }
}

fn ensure_fits(
    warehouse_id: WarehouseId,
    capacity: Quantity,
    committed: u64,
    quantity: Quantity,
) -> Result<(), InventoryError> {
    let requested = quantity.as_u64();
    if committed + requested > capacity.as_u64() {
        warn!(%warehouse_id, %capacity, committed, requested, "capacity exceeded");
        return Err(InventoryError::CapacityExceeded {
            warehouse_id,
            capacity,
            committed,
            requested,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn q(n: i64) -> Quantity {
        Quantity::try_from(n).unwrap()
    }

    async fn guard_with_warehouse(capacity: i64) -> (CapacityGuard, WarehouseId) {
        let guard = CapacityGuard::new(Arc::new(MemoryStore::new()), Duration::from_secs(5));
        let warehouse = guard
            .create_warehouse("Main", "Dock 1", q(capacity))
            .await
            .unwrap();
        (guard, warehouse.id)
    }

    #[tokio::test]
    async fn test_upsert_within_capacity() {
        let (guard, w) = guard_with_warehouse(10).await;
        guard.upsert_inventory(w, ProductId::new(1), q(6)).await.unwrap();

        let err = guard
            .upsert_inventory(w, ProductId::new(2), q(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::CapacityExceeded {
                committed: 6,
                requested: 5,
                ..
            }
        ));

        let usage = guard.usage(w).await.unwrap();
        assert_eq!(usage.committed, 6);
        assert_eq!(usage.available(), 4);
    }

    #[tokio::test]
    async fn test_upsert_fills_to_exact_capacity() {
        let (guard, w) = guard_with_warehouse(10).await;
        guard.upsert_inventory(w, ProductId::new(1), q(6)).await.unwrap();
        guard.upsert_inventory(w, ProductId::new(2), q(4)).await.unwrap();
        assert_eq!(guard.usage(w).await.unwrap().committed, 10);
    }

    #[tokio::test]
    async fn test_upsert_is_additive() {
        let (guard, w) = guard_with_warehouse(10).await;
        let first = guard.upsert_inventory(w, ProductId::new(1), q(3)).await.unwrap();
        let second = guard.upsert_inventory(w, ProductId::new(1), q(4)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, q(7));
    }

    #[tokio::test]
    async fn test_update_excludes_own_quantity() {
        let (guard, w) = guard_with_warehouse(10).await;
        let record = guard.upsert_inventory(w, ProductId::new(1), q(8)).await.unwrap();
        guard.upsert_inventory(w, ProductId::new(2), q(2)).await.unwrap();

        let updated = guard.update_inventory_quantity(record.id, q(8)).await.unwrap();
        assert_eq!(updated.quantity, q(8));
        guard.update_inventory_quantity(record.id, q(3)).await.unwrap();
        assert!(matches!(
            guard.update_inventory_quantity(record.id, q(9)).await,
            Err(InventoryError::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_resize_below_committed_rejected() {
        let (guard, w) = guard_with_warehouse(10).await;
        guard.upsert_inventory(w, ProductId::new(1), q(7)).await.unwrap();

        assert!(matches!(
            guard.resize_warehouse(w, q(6)).await,
            Err(InventoryError::CapacityBelowCommitted { committed: 7, .. })
        ));
        let resized = guard.resize_warehouse(w, q(7)).await.unwrap();
        assert_eq!(resized.capacity, q(7));
    }

    #[tokio::test]
    async fn test_delete_warehouse_requires_empty() {
        let (guard, w) = guard_with_warehouse(10).await;
        let record = guard.upsert_inventory(w, ProductId::new(1), q(1)).await.unwrap();

        assert!(matches!(
            guard.delete_warehouse(w).await,
            Err(InventoryError::WarehouseNotEmpty { records: 1, .. })
        ));
        guard.delete_inventory(record.id).await.unwrap();
        guard.delete_warehouse(w).await.unwrap();
        assert!(matches!(
            guard.usage(w).await,
            Err(InventoryError::NotFound("warehouse"))
        ));
    }

    #[tokio::test]
    async fn test_missing_targets() {
        let (guard, _) = guard_with_warehouse(10).await;
        assert!(matches!(
            guard
                .upsert_inventory(WarehouseId::new(999), ProductId::new(1), q(1))
                .await,
            Err(InventoryError::NotFound("warehouse"))
        ));
        assert!(matches!(
            guard.delete_inventory(InventoryRecordId::new(999)).await,
            Err(InventoryError::NotFound("inventory record"))
        ));
    }

    #[tokio::test]
    async fn test_blank_warehouse_name_rejected() {
        let guard = CapacityGuard::new(Arc::new(MemoryStore::new()), Duration::from_secs(5));
        assert!(matches!(
            guard.create_warehouse("  ", "Dock", q(1)).await,
            Err(InventoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_never_overfill() {
        let (guard, w) = guard_with_warehouse(10).await;

        let tasks: Vec<_> = (1..=2)
            .map(|product| {
                let guard = guard.clone();
                tokio::spawn(async move {
                    guard
                        .upsert_inventory(w, ProductId::new(product), q(6))
                        .await
                })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(guard.usage(w).await.unwrap().committed, 6);
    }
}
