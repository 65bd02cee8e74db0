//! Housekeeping command.
//!
//! Expired sessions and tokens are already rejected on read; this only
//! reclaims their rows.

use super::{CommandError, services};

/// Delete expired sessions and used or expired reset tokens.
///
/// # Errors
///
/// Returns an error if either delete fails.
pub async fn run() -> Result<(), CommandError> {
    let state = services().await?;

    let sessions = state.sessions().purge_expired().await?;
    let tokens = state.resets().purge_stale().await?;

    tracing::info!("Pruned {sessions} expired sessions and {tokens} stale reset tokens");
    Ok(())
}
