//! Warehouse API handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use depot_core::{Quantity, WarehouseId};
use serde::{Deserialize, Serialize};

use super::quantity;
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Warehouse, WarehouseUsage};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWarehouse {
    pub name: String,
    pub location: String,
    pub capacity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ResizeWarehouse {
    pub capacity: i64,
}

/// Capacity view of a warehouse.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub warehouse_id: WarehouseId,
    pub capacity: Quantity,
    pub committed: u64,
    pub available: u64,
}

impl From<WarehouseUsage> for UsageResponse {
    fn from(usage: WarehouseUsage) -> Self {
        Self {
            warehouse_id: usage.warehouse_id,
            capacity: usage.capacity,
            committed: usage.committed,
            available: usage.available(),
        }
    }
}

/// Create a warehouse. Capacity must be positive.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(body): Json<CreateWarehouse>,
) -> Result<(StatusCode, Json<Warehouse>)> {
    let capacity = quantity("capacity", body.capacity)?;
    if capacity == Quantity::ZERO {
        return Err(AppError::BadRequest(
            "capacity: must be greater than zero".to_owned(),
        ));
    }

    let warehouse = state
        .capacity()
        .create_warehouse(&body.name, &body.location, capacity)
        .await?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

/// Show a warehouse's capacity and committed units.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<WarehouseId>,
) -> Result<Json<UsageResponse>> {
    let usage = state.capacity().usage(id).await?;
    Ok(Json(usage.into()))
}

/// Change a warehouse's capacity.
pub async fn resize(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<WarehouseId>,
    Json(body): Json<ResizeWarehouse>,
) -> Result<Json<Warehouse>> {
    let capacity = quantity("capacity", body.capacity)?;
    let warehouse = state.capacity().resize_warehouse(id, capacity).await?;
    Ok(Json(warehouse))
}

/// Delete an empty warehouse.
pub async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<WarehouseId>,
) -> Result<StatusCode> {
    state.capacity().delete_warehouse(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
