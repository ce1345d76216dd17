use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, name, is_verified, \
     verification_code, code_expires_at, voice_preference, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub is_verified: bool,
    pub verification_code: Option<String>,
    pub code_expires_at: Option<OffsetDateTime>,
    pub voice_preference: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// A code matches only while both fields are set and the expiry is
    /// strictly in the future; at exactly `code_expires_at` it is stale.
    pub fn code_matches(&self, candidate: &str, now: OffsetDateTime) -> bool {
        match (&self.verification_code, self.code_expires_at) {
            (Some(code), Some(expires_at)) => code == candidate && now < expires_at,
            _ => false,
        }
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Creates a fresh unverified account holding a pending verification code.
    pub async fn create_unverified(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, verification_code, code_expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(code)
        .bind(expires_at)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Re-registration of an abandoned signup: overwrite name, password and
    /// code so the latest attempt wins.
    pub async fn refresh_pending(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        password_hash: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users
             SET name = $2, password_hash = $3, verification_code = $4, code_expires_at = $5
             WHERE id = $1",
        )
        .bind(id)
        .bind(name)
        .bind(password_hash)
        .bind(code)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Issues a new code, invalidating whatever code was outstanding.
    pub async fn refresh_code(
        db: &PgPool,
        id: Uuid,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET verification_code = $2, code_expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(code)
            .bind(expires_at)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Signup verification succeeded: the code is single-use.
    pub async fn mark_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users
             SET is_verified = TRUE, verification_code = NULL, code_expires_at = NULL
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Any password change invalidates outstanding codes.
    pub async fn set_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users
             SET password_hash = $2, verification_code = NULL, code_expires_at = NULL
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn apply_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        voice_preference: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $2, voice_preference = $3 WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(voice_preference)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Conversations go with the user via the FK cascade.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}
