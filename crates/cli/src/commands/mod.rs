//! CLI command implementations.

pub mod migrate;
pub mod prune;
pub mod user;

use std::sync::Arc;

use depot_server::config::{ConfigError, ServerConfig, StoreBackend};
use depot_server::db::{self, PgStore};
use depot_server::services::AuthError;
use depot_server::state::{AppState, StateError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operator commands act on the database; the memory store has nothing to act on.
    #[error("DEPOT_STORE=memory has no persistent data to operate on")]
    MemoryStore,

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to initialize services: {0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Auth(#[from] AuthError),
}

/// Load configuration and connect to the configured database.
async fn connect() -> Result<(ServerConfig, PgStore), CommandError> {
    let config = ServerConfig::from_env()?;
    let StoreBackend::Postgres { database_url } = &config.store else {
        return Err(CommandError::MemoryStore);
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(database_url).await?;
    Ok((config, PgStore::new(pool)))
}

/// Connect and build the same services the server runs with.
async fn services() -> Result<AppState, CommandError> {
    let (config, store) = connect().await?;
    Ok(AppState::new(config, Arc::new(store))?)
}
