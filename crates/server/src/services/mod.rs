//! Business logic.
//!
//! Each service owns only the store slice it needs and bounds every store
//! call with the configured deadline, so a stalled backend surfaces as a
//! `StoreUnavailable` error instead of a hung request.

pub mod auth;
pub mod capacity;
pub mod password;
pub mod password_reset;
pub mod rate_limit;
pub mod session;

use std::future::Future;
use std::time::Duration;

use crate::db::RepositoryError;

pub use auth::{AuthError, AuthService};
pub use capacity::{CapacityGuard, InventoryError};
pub use password::{MIN_PASSWORD_LENGTH, PasswordHasher};
pub use password_reset::{
    LogResetLinkSink, PasswordResetManager, RedeemOutcome, ResetDelivery, ResetLinkSink,
    ResetRequest, TokenState,
};
pub use rate_limit::{CounterStore, MemoryCounterStore, RateLimiter};
pub use session::{SessionManager, require_admin, require_authenticated};

/// Run a store future, failing with [`RepositoryError::Timeout`] past `limit`.
///
/// Dropping a timed-out future rolls back any transaction or scope it held.
pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(RepositoryError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, RepositoryError>(())
        };
        let result = bounded(Duration::from_millis(50), slow).await;
        assert!(matches!(result, Err(RepositoryError::Timeout)));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, RepositoryError>(7) }).await;
        assert!(matches!(result, Ok(7)));
    }
}
