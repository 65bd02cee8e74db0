//! JSON API routes.
//!
//! Every path here sits behind the per-client rate limit.

pub mod inventory;
pub mod me;
pub mod warehouses;

use axum::{
    Router,
    routing::{get, post, put},
};
use depot_core::Quantity;

use crate::error::AppError;
use crate::state::AppState;

/// Create the `/api` routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me::show))
        .route("/warehouses", post(warehouses::create))
        .route(
            "/warehouses/{id}",
            get(warehouses::show).delete(warehouses::destroy),
        )
        .route("/warehouses/{id}/capacity", put(warehouses::resize))
        .route("/inventory", post(inventory::upsert))
        .route(
            "/inventory/{id}",
            put(inventory::update).delete(inventory::destroy),
        )
}

/// Convert a client-supplied count into a [`Quantity`].
fn quantity(field: &str, value: i64) -> Result<Quantity, AppError> {
    Quantity::try_from(value).map_err(|e| AppError::BadRequest(format!("{field}: {e}")))
}
