//! Warehouses and the inventory records stored in them.

use chrono::{DateTime, Utc};
use depot_core::{InventoryRecordId, ProductId, Quantity, WarehouseId};
use serde::Serialize;

/// A storage location with a fixed unit capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: String,
    pub capacity: Quantity,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a warehouse.
#[derive(Debug, Clone)]
pub struct NewWarehouse {
    pub name: String,
    pub location: String,
    pub capacity: Quantity,
}

/// Units of one product held in one warehouse.
///
/// At most one record exists per `(warehouse_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRecord {
    pub id: InventoryRecordId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

/// Capacity and committed units of a warehouse at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarehouseUsage {
    pub warehouse_id: WarehouseId,
    pub capacity: Quantity,
    /// Sum of quantities over every record in the warehouse.
    pub committed: u64,
}

impl WarehouseUsage {
    /// Units still available before the capacity is reached.
    #[must_use]
    pub const fn available(&self) -> u64 {
        self.capacity.as_u64().saturating_sub(self.committed)
    }
}
