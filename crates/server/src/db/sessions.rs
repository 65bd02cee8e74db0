//! Session queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::users::UserRow;
use super::{PgStore, RepositoryError};
use crate::models::{OpaqueToken, Session, User};
use crate::store::SessionStore;

#[derive(sqlx::FromRow)]
struct SessionWithUserRow {
    session_id: String,
    session_expires_at: DateTime<Utc>,
    session_created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: UserRow,
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO sessions (id, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(session.id.as_str())
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(
        &self,
        id: &OpaqueToken,
    ) -> Result<Option<(Session, User)>, RepositoryError> {
        let row: Option<SessionWithUserRow> = sqlx::query_as(
            r"
            SELECT s.id AS session_id,
                   s.expires_at AS session_expires_at,
                   s.created_at AS session_created_at,
                   u.id, u.email, u.role, u.created_at, u.updated_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let user: User = r.user.into();
            let session = Session {
                id: OpaqueToken::from_stored(r.session_id),
                user_id: user.id,
                expires_at: r.session_expires_at,
                created_at: r.session_created_at,
            };
            (session, user)
        }))
    }

    async fn delete_session(&self, id: &OpaqueToken) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
