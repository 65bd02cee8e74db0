//! Single-use password-reset tokens.
//!
//! Requesting a reset never reveals whether the email belongs to an account:
//! the caller gets the same [`ResetRequest::message`] either way, and only
//! the delivery payload (handed to a [`ResetLinkSink`]) differs. Redeeming
//! is one atomic store operation, so a token can change the password at
//! most once even under concurrent submissions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use depot_core::{Email, UserId};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::password::{PasswordHasher, validate_password};
use super::{AuthError, bounded};
use crate::models::{OpaqueToken, PasswordResetToken};
use crate::store::{Redemption, ResetTokenStore, UserStore};

/// How long a reset token stays valid after issue.
pub const RESET_TOKEN_TTL: TimeDelta = TimeDelta::hours(1);

/// Response shown for every reset request, whether or not the account exists.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists with this email, you will receive a password reset link";

/// Path of the page that accepts a reset token.
const RESET_PATH: &str = "reset-password";

/// Outcome of a reset request.
#[derive(Debug)]
pub struct ResetRequest {
    delivery: Option<ResetDelivery>,
}

impl ResetRequest {
    /// The caller-facing message. Identical for known and unknown emails.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        RESET_REQUESTED_MESSAGE
    }

    /// What to send, if an account matched.
    #[must_use]
    pub fn into_delivery(self) -> Option<ResetDelivery> {
        self.delivery
    }
}

/// Data needed to send a reset link to an account owner.
#[derive(Clone)]
pub struct ResetDelivery {
    pub email: Email,
    pub token: OpaqueToken,
    pub link: Url,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for ResetDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetDelivery")
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Destination for prepared reset links.
///
/// Email delivery is out of scope for the server; deployments plug a mailer
/// in here.
pub trait ResetLinkSink: Send + Sync {
    fn deliver(&self, delivery: ResetDelivery);
}

/// Sink that records deliveries in the log.
///
/// The link itself is only logged when `reveal_links` is set, which is meant
/// for local development.
#[derive(Debug, Clone, Copy)]
pub struct LogResetLinkSink {
    reveal_links: bool,
}

impl LogResetLinkSink {
    #[must_use]
    pub const fn new(reveal_links: bool) -> Self {
        Self { reveal_links }
    }
}

impl ResetLinkSink for LogResetLinkSink {
    fn deliver(&self, delivery: ResetDelivery) {
        if self.reveal_links {
            info!(email = %delivery.email, link = %delivery.link, "password reset link");
        } else {
            info!(email_domain = delivery.email.domain(), "password reset link prepared");
        }
    }
}

/// Facts about a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidReset {
    pub user_id: UserId,
    pub email: Email,
    pub expires_at: DateTime<Utc>,
}

/// Result of checking a reset token without consuming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid(ValidReset),
    InvalidOrExpired,
    AlreadyUsed,
}

/// Result of redeeming a reset token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// The password was replaced and the owner's sessions revoked.
    PasswordReset {
        user_id: UserId,
        sessions_revoked: u64,
    },
    InvalidOrExpired,
    AlreadyUsed,
}

/// Issues, validates and redeems password-reset tokens.
#[derive(Clone)]
pub struct PasswordResetManager {
    tokens: Arc<dyn ResetTokenStore>,
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    base_url: Url,
    timeout: Duration,
}

impl PasswordResetManager {
    #[must_use]
    pub fn new(
        tokens: Arc<dyn ResetTokenStore>,
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        base_url: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            users,
            hasher,
            base_url,
            timeout,
        }
    }

    /// Start a reset for `email`.
    ///
    /// Unknown emails and failures after the account lookup both produce a
    /// request with no delivery, which the caller cannot tell apart from
    /// success.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for malformed input and
    /// `AuthError::StoreUnavailable` if the account lookup itself fails.
    #[instrument(skip_all)]
    pub async fn request_reset(&self, email: &str) -> Result<ResetRequest, AuthError> {
        let email = Email::parse(email)?;

        let Some(user) = bounded(self.timeout, self.users.get_user_by_email(&email)).await? else {
            debug!("reset requested for unknown account");
            return Ok(ResetRequest { delivery: None });
        };

        let now = Utc::now();
        let token = PasswordResetToken {
            token: OpaqueToken::generate(),
            user_id: user.id,
            expires_at: now + RESET_TOKEN_TTL,
            used_at: None,
            created_at: now,
        };

        if let Err(e) = bounded(self.timeout, self.tokens.insert_reset_token(&token)).await {
            error!(user_id = %user.id, error = %e, "failed to store reset token");
            return Ok(ResetRequest { delivery: None });
        }

        let link = self.reset_link(&token.token);
        info!(user_id = %user.id, "reset token issued");

        Ok(ResetRequest {
            delivery: Some(ResetDelivery {
                email: user.email,
                token: token.token,
                link,
                expires_at: token.expires_at,
            }),
        })
    }

    /// Check a token without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the lookup fails.
    pub async fn validate(&self, token: &str) -> Result<TokenState, AuthError> {
        let Some(token) = OpaqueToken::from_client(token) else {
            return Ok(TokenState::InvalidOrExpired);
        };

        let found = bounded(self.timeout, self.tokens.find_reset_token(&token)).await?;
        Ok(match found {
            None => TokenState::InvalidOrExpired,
            Some((record, _)) if record.is_used() => TokenState::AlreadyUsed,
            Some((record, _)) if record.is_expired_at(Utc::now()) => TokenState::InvalidOrExpired,
            Some((record, user)) => TokenState::Valid(ValidReset {
                user_id: user.id,
                email: user.email,
                expires_at: record.expires_at,
            }),
        })
    }

    /// Consume a token and set a new password.
    ///
    /// On success every session of the account is revoked in the same unit
    /// of work. A token that has been used stays used; later attempts get
    /// [`RedeemOutcome::AlreadyUsed`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the password fails the policy
    /// and `AuthError::StoreUnavailable` if the store fails or times out.
    #[instrument(skip_all)]
    pub async fn redeem(&self, token: &str, new_password: &str) -> Result<RedeemOutcome, AuthError> {
        match self.validate(token).await? {
            TokenState::Valid(_) => {}
            TokenState::InvalidOrExpired => return Ok(RedeemOutcome::InvalidOrExpired),
            TokenState::AlreadyUsed => return Ok(RedeemOutcome::AlreadyUsed),
        }
        let Some(token) = OpaqueToken::from_client(token) else {
            return Ok(RedeemOutcome::InvalidOrExpired);
        };

        validate_password(new_password)?;
        let password_hash = self.hasher.hash(new_password)?;

        let redemption = bounded(
            self.timeout,
            self.tokens
                .redeem_reset_token(&token, &password_hash, Utc::now()),
        )
        .await?;

        match redemption {
            Redemption::Redeemed {
                user_id,
                sessions_revoked,
            } => {
                info!(%user_id, sessions_revoked, "password reset");
                Ok(RedeemOutcome::PasswordReset {
                    user_id,
                    sessions_revoked,
                })
            }
            // Lost a race or crossed the expiry since validation; report
            // whichever state the token is in now.
            Redemption::Rejected => match self.validate(token.as_str()).await? {
                TokenState::AlreadyUsed => {
                    warn!("reset token redeemed concurrently");
                    Ok(RedeemOutcome::AlreadyUsed)
                }
                TokenState::Valid(_) | TokenState::InvalidOrExpired => {
                    Ok(RedeemOutcome::InvalidOrExpired)
                }
            },
        }
    }

    /// Delete used and expired tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the delete fails.
    pub async fn purge_stale(&self) -> Result<u64, AuthError> {
        let removed =
            bounded(self.timeout, self.tokens.delete_stale_reset_tokens(Utc::now())).await?;
        if removed > 0 {
            info!(removed, "stale reset tokens purged");
        }
        Ok(removed)
    }

    fn reset_link(&self, token: &OpaqueToken) -> Url {
        let mut link = self.base_url.clone();
        let path = format!("{}/{RESET_PATH}", link.path().trim_end_matches('/'));
        link.set_path(&path);
        link.set_query(None);
        link.set_fragment(None);
        link.query_pairs_mut().append_pair("token", token.as_str());
        link
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use depot_core::Role;

    use super::*;
    use crate::config::HashingConfig;
    use crate::models::Session;
    use crate::store::{MemoryStore, SessionStore};

    struct Fixture {
        store: MemoryStore,
        manager: PasswordResetManager,
        hasher: PasswordHasher,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let hasher = PasswordHasher::new(&HashingConfig::minimal()).unwrap();
        store
            .create_user(
                &Email::parse("a@x.com").unwrap(),
                &hasher.hash("secret123").unwrap(),
                Role::User,
            )
            .await
            .unwrap();
        let manager = PasswordResetManager::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            hasher.clone(),
            Url::parse("https://depot.example/app?x=1").unwrap(),
            Duration::from_secs(5),
        );
        Fixture {
            store,
            manager,
            hasher,
        }
    }

    async fn issue(f: &Fixture) -> ResetDelivery {
        f.manager
            .request_reset("a@x.com")
            .await
            .unwrap()
            .into_delivery()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_email_looks_like_success() {
        let f = fixture().await;
        let known = f.manager.request_reset("a@x.com").await.unwrap();
        let unknown = f.manager.request_reset("nobody@x.com").await.unwrap();

        assert_eq!(known.message(), unknown.message());
        assert!(known.into_delivery().is_some());
        assert!(unknown.into_delivery().is_none());
    }

    #[test]
    fn test_link_keeps_base_path() {
        let store = MemoryStore::new();
        let link_for = |base: &str| {
            let manager = PasswordResetManager::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                PasswordHasher::new(&HashingConfig::minimal()).unwrap(),
                Url::parse(base).unwrap(),
                Duration::from_secs(5),
            );
            manager.reset_link(&OpaqueToken::from_stored("abc".to_owned()))
        };

        assert_eq!(
            link_for("https://depot.example").as_str(),
            "https://depot.example/reset-password?token=abc"
        );
        assert_eq!(
            link_for("https://depot.example/portal/#top").as_str(),
            "https://depot.example/portal/reset-password?token=abc"
        );
        assert_eq!(
            link_for("http://localhost:3000/a/b?next=1").as_str(),
            "http://localhost:3000/a/b/reset-password?token=abc"
        );
    }

    #[tokio::test]
    async fn test_link_points_at_reset_page() {
        let f = fixture().await;
        let delivery = issue(&f).await;

        assert_eq!(delivery.link.path(), "/app/reset-password");
        assert_eq!(
            delivery.link.query(),
            Some(format!("token={}", delivery.token.as_str()).as_str())
        );
        assert!(delivery.expires_at - Utc::now() <= RESET_TOKEN_TTL);
    }

    #[tokio::test]
    async fn test_redeem_once() {
        let f = fixture().await;
        let delivery = issue(&f).await;
        let token = delivery.token.as_str();

        assert!(matches!(
            f.manager.validate(token).await.unwrap(),
            TokenState::Valid(_)
        ));
        assert!(matches!(
            f.manager.redeem(token, "newpass123").await.unwrap(),
            RedeemOutcome::PasswordReset { .. }
        ));
        assert_eq!(
            f.manager.redeem(token, "otherpass123").await.unwrap(),
            RedeemOutcome::AlreadyUsed
        );
        assert_eq!(
            f.manager.validate(token).await.unwrap(),
            TokenState::AlreadyUsed
        );

        let (_, hash) = f
            .store
            .get_password_hash(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(f.hasher.verify("newpass123", &hash).is_ok());
    }

    #[tokio::test]
    async fn test_redeem_revokes_sessions() {
        let f = fixture().await;
        let user = f
            .store
            .get_user_by_email(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        let now = Utc::now();
        f.store
            .insert_session(&Session {
                id: OpaqueToken::generate(),
                user_id: user.id,
                expires_at: now + TimeDelta::days(1),
                created_at: now,
            })
            .await
            .unwrap();

        let delivery = issue(&f).await;
        let outcome = f
            .manager
            .redeem(delivery.token.as_str(), "newpass123")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RedeemOutcome::PasswordReset {
                user_id: user.id,
                sessions_revoked: 1
            }
        );
        assert_eq!(f.store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_and_unknown_tokens() {
        let f = fixture().await;
        let user = f
            .store
            .get_user_by_email(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        let now = Utc::now();
        let expired = PasswordResetToken {
            token: OpaqueToken::generate(),
            user_id: user.id,
            expires_at: now - TimeDelta::seconds(1),
            used_at: None,
            created_at: now - RESET_TOKEN_TTL,
        };
        f.store.insert_reset_token(&expired).await.unwrap();

        assert_eq!(
            f.manager.redeem(expired.token.as_str(), "newpass123").await.unwrap(),
            RedeemOutcome::InvalidOrExpired
        );
        assert_eq!(
            f.manager.validate(OpaqueToken::generate().as_str()).await.unwrap(),
            TokenState::InvalidOrExpired
        );
        assert_eq!(
            f.manager.validate("not a token").await.unwrap(),
            TokenState::InvalidOrExpired
        );
    }

    #[tokio::test]
    async fn test_older_tokens_stay_valid() {
        let f = fixture().await;
        let first = issue(&f).await;
        let second = issue(&f).await;

        assert!(matches!(
            f.manager.validate(first.token.as_str()).await.unwrap(),
            TokenState::Valid(_)
        ));
        assert!(matches!(
            f.manager.validate(second.token.as_str()).await.unwrap(),
            TokenState::Valid(_)
        ));
    }

    #[tokio::test]
    async fn test_weak_password_keeps_token_usable() {
        let f = fixture().await;
        let delivery = issue(&f).await;

        assert!(matches!(
            f.manager.redeem(delivery.token.as_str(), "short").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            f.manager.validate(delivery.token.as_str()).await.unwrap(),
            TokenState::Valid(_)
        ));
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let f = fixture().await;
        let delivery = issue(&f).await;
        f.manager
            .redeem(delivery.token.as_str(), "newpass123")
            .await
            .unwrap();
        issue(&f).await;

        assert_eq!(f.manager.purge_stale().await.unwrap(), 1);
    }
}
