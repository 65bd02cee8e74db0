//! Warehouse and inventory queries.
//!
//! A [`WarehouseScope`] here is a transaction that starts by taking
//! `SELECT ... FOR UPDATE` on the warehouse row. Every capacity check and
//! write for that warehouse runs inside it, so two scopes on the same
//! warehouse run one after the other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::{InventoryRecordId, ProductId, Quantity, WarehouseId};
use sqlx::{Postgres, Transaction};

use super::{PgStore, RepositoryError, corrupt};
use crate::models::{InventoryRecord, NewWarehouse, Warehouse};
use crate::store::{InventoryStore, WarehouseScope};

const WAREHOUSE_COLUMNS: &str = "id, name, location, capacity, created_at";
const RECORD_COLUMNS: &str = "id, warehouse_id, product_id, quantity, updated_at";

#[derive(sqlx::FromRow)]
struct WarehouseRow {
    id: WarehouseId,
    name: String,
    location: String,
    capacity: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<WarehouseRow> for Warehouse {
    type Error = RepositoryError;

    fn try_from(row: WarehouseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            location: row.location,
            capacity: Quantity::try_from(row.capacity).map_err(|e| corrupt("capacity", e))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: InventoryRecordId,
    warehouse_id: WarehouseId,
    product_id: ProductId,
    quantity: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for InventoryRecord {
    type Error = RepositoryError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            warehouse_id: row.warehouse_id,
            product_id: row.product_id,
            quantity: Quantity::try_from(row.quantity).map_err(|e| corrupt("quantity", e))?,
            updated_at: row.updated_at,
        })
    }
}

fn non_negative(value: i64, what: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|e| corrupt(what, e))
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn create_warehouse(&self, new: &NewWarehouse) -> Result<Warehouse, RepositoryError> {
        let row: WarehouseRow = sqlx::query_as(&format!(
            "INSERT INTO warehouses (name, location, capacity) VALUES ($1, $2, $3) \
             RETURNING {WAREHOUSE_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.location)
        .bind(new.capacity.as_i32())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_record(
        &self,
        id: InventoryRecordId,
    ) -> Result<Option<InventoryRecord>, RepositoryError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn lock_warehouse(
        &self,
        id: WarehouseId,
    ) -> Result<Option<Box<dyn WarehouseScope>>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<WarehouseRow> = sqlx::query_as(&format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Box::new(PgWarehouseScope {
            tx,
            warehouse: row.try_into()?,
        })))
    }
}

/// Transaction holding the row lock on one warehouse.
struct PgWarehouseScope {
    tx: Transaction<'static, Postgres>,
    warehouse: Warehouse,
}

#[async_trait]
impl WarehouseScope for PgWarehouseScope {
    fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    async fn committed_total(
        &mut self,
        excluding: Option<InventoryRecordId>,
    ) -> Result<u64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM inventory_records
            WHERE warehouse_id = $1 AND ($2::INTEGER IS NULL OR id <> $2)
            ",
        )
        .bind(self.warehouse.id)
        .bind(excluding)
        .fetch_one(&mut *self.tx)
        .await?;

        non_negative(total, "committed total")
    }

    async fn record_count(&mut self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inventory_records WHERE warehouse_id = $1")
                .bind(self.warehouse.id)
                .fetch_one(&mut *self.tx)
                .await?;

        non_negative(count, "record count")
    }

    async fn record(
        &mut self,
        id: InventoryRecordId,
    ) -> Result<Option<InventoryRecord>, RepositoryError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records WHERE id = $1 AND warehouse_id = $2"
        ))
        .bind(id)
        .bind(self.warehouse.id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn add_units(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, RepositoryError> {
        let row: RecordRow = sqlx::query_as(&format!(
            "INSERT INTO inventory_records (warehouse_id, product_id, quantity) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (warehouse_id, product_id) DO UPDATE \
             SET quantity = inventory_records.quantity + EXCLUDED.quantity, updated_at = now() \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(self.warehouse.id)
        .bind(product_id)
        .bind(quantity.as_i32())
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn set_record_quantity(
        &mut self,
        id: InventoryRecordId,
        quantity: Quantity,
    ) -> Result<InventoryRecord, RepositoryError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "UPDATE inventory_records SET quantity = $3, updated_at = now() \
             WHERE id = $1 AND warehouse_id = $2 \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id)
        .bind(self.warehouse.id)
        .bind(quantity.as_i32())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn delete_record(&mut self, id: InventoryRecordId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM inventory_records WHERE id = $1 AND warehouse_id = $2")
                .bind(id)
                .bind(self.warehouse.id)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_capacity(&mut self, capacity: Quantity) -> Result<Warehouse, RepositoryError> {
        let row: WarehouseRow = sqlx::query_as(&format!(
            "UPDATE warehouses SET capacity = $2 WHERE id = $1 RETURNING {WAREHOUSE_COLUMNS}"
        ))
        .bind(self.warehouse.id)
        .bind(capacity.as_i32())
        .fetch_one(&mut *self.tx)
        .await?;

        self.warehouse = row.try_into()?;
        Ok(self.warehouse.clone())
    }

    async fn delete_warehouse(&mut self) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(self.warehouse.id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict(
                        "warehouse still holds inventory".to_owned(),
                    );
                }
                RepositoryError::Database(e)
            })?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
