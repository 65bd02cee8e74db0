//! Account management commands.

use depot_core::Role;

use super::{CommandError, services};

/// Create an account with the given role.
///
/// The password goes through the same policy and hashing as registration.
///
/// # Errors
///
/// Returns an error if the email is taken or invalid, or the password is
/// too short.
pub async fn create(email: &str, password: &str, role: Role) -> Result<(), CommandError> {
    let state = services().await?;
    let user = state.auth().create_account(email, password, role).await?;

    tracing::info!("Created account {} ({}) with id {}", user.email, user.role, user.id);
    Ok(())
}

/// Set the role of an existing account.
///
/// # Errors
///
/// Returns an error if no account has this email.
pub async fn promote(email: &str, role: Role) -> Result<(), CommandError> {
    let state = services().await?;
    let user = state.auth().set_role(email, role).await?;

    tracing::info!("{} is now {}", user.email, user.role);
    Ok(())
}
