//! Inventory record API handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use depot_core::{InventoryRecordId, ProductId, WarehouseId};
use serde::Deserialize;

use super::quantity;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::InventoryRecord;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertInventory {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInventory {
    pub quantity: i64,
}

/// Add units of a product to a warehouse.
pub async fn upsert(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Json(body): Json<UpsertInventory>,
) -> Result<Json<InventoryRecord>> {
    let quantity = quantity("quantity", body.quantity)?;
    let record = state
        .capacity()
        .upsert_inventory(body.warehouse_id, body.product_id, quantity)
        .await?;
    Ok(Json(record))
}

/// Replace the quantity of a record.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<InventoryRecordId>,
    Json(body): Json<UpdateInventory>,
) -> Result<Json<InventoryRecord>> {
    let quantity = quantity("quantity", body.quantity)?;
    let record = state
        .capacity()
        .update_inventory_quantity(id, quantity)
        .await?;
    Ok(Json(record))
}

pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<InventoryRecordId>,
) -> Result<StatusCode> {
    state.capacity().delete_inventory(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
