//! Domain models shared by the store, services and routes.

pub mod inventory;
pub mod password_reset;
pub mod session;
pub mod token;
pub mod user;

pub use inventory::{InventoryRecord, NewWarehouse, Warehouse, WarehouseUsage};
pub use password_reset::PasswordResetToken;
pub use session::{CurrentUser, Session};
pub use token::OpaqueToken;
pub use user::User;
