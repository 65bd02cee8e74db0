//! Password-reset token queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::UserId;

use super::users::UserRow;
use super::{PgStore, RepositoryError};
use crate::models::{OpaqueToken, PasswordResetToken, User};
use crate::store::{Redemption, ResetTokenStore};

#[derive(sqlx::FromRow)]
struct TokenWithUserRow {
    token: String,
    token_expires_at: DateTime<Utc>,
    token_used_at: Option<DateTime<Utc>>,
    token_created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: UserRow,
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn insert_reset_token(&self, token: &PasswordResetToken) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO password_reset_tokens (token, user_id, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(token.token.as_str())
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_reset_token(
        &self,
        token: &OpaqueToken,
    ) -> Result<Option<(PasswordResetToken, User)>, RepositoryError> {
        let row: Option<TokenWithUserRow> = sqlx::query_as(
            r"
            SELECT t.token,
                   t.expires_at AS token_expires_at,
                   t.used_at AS token_used_at,
                   t.created_at AS token_created_at,
                   u.id, u.email, u.role, u.created_at, u.updated_at
            FROM password_reset_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token = $1
            ",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let user: User = r.user.into();
            let token = PasswordResetToken {
                token: OpaqueToken::from_stored(r.token),
                user_id: user.id,
                expires_at: r.token_expires_at,
                used_at: r.token_used_at,
                created_at: r.token_created_at,
            };
            (token, user)
        }))
    }

    async fn redeem_reset_token(
        &self,
        token: &OpaqueToken,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Concurrent claims serialize on the row lock; the loser re-evaluates
        // the predicate against the committed `used_at` and matches nothing.
        let claimed: Option<UserId> = sqlx::query_scalar(
            r"
            UPDATE password_reset_tokens
            SET used_at = $2
            WHERE token = $1 AND used_at IS NULL AND expires_at >= $2
            RETURNING user_id
            ",
        )
        .bind(token.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = claimed else {
            return Ok(Redemption::Rejected);
        };

        let updated = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "reset token owner {user_id} missing"
            )));
        }

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Redemption::Redeemed {
            user_id,
            sessions_revoked: revoked.rows_affected(),
        })
    }

    async fn delete_stale_reset_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM password_reset_tokens WHERE used_at IS NOT NULL OR expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
