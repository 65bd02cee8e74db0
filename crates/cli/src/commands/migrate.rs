//! Database migration command.
//!
//! Migration files live in `crates/server/migrations/`.

use super::{CommandError, connect};

/// Apply every pending migration.
///
/// # Errors
///
/// Returns an error if the connection or any migration fails.
pub async fn run() -> Result<(), CommandError> {
    let (_, store) = connect().await?;

    tracing::info!("Running migrations...");
    depot_server::db::MIGRATOR.run(store.pool()).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
