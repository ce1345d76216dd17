use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Stored practice session. The turn list is kept as an opaque JSON string
/// and deserialized on read; rows are immutable except for deletion.
#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversation_data: String,
    pub created_at: OffsetDateTime,
}

impl Conversation {
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        conversation_data: &str,
    ) -> anyhow::Result<Conversation> {
        let convo = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (user_id, conversation_data)
            VALUES ($1, $2)
            RETURNING id, user_id, conversation_data, created_at
            "#,
        )
        .bind(user_id)
        .bind(conversation_data)
        .fetch_one(db)
        .await?;
        Ok(convo)
    }

    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, conversation_data, created_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Returns whether a row was actually deleted; ownership is part of the
    /// predicate so users cannot delete each other's history.
    pub async fn delete(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
