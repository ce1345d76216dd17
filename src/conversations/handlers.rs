use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{dto::MessageResponse, jwt::CurrentUser},
    conversations::{
        dto::{ConversationPayload, ConversationRead, QaPair},
        repo::Conversation,
    },
    error::ApiError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(save_conversation),
        )
        .route("/conversations/:id", delete(delete_conversation))
}

fn read_view(convo: Conversation) -> Result<ConversationRead, ApiError> {
    let turns: Vec<QaPair> = serde_json::from_str(&convo.conversation_data)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored conversation unreadable: {e}")))?;
    Ok(ConversationRead {
        id: convo.id,
        conversation: turns,
        created_at: convo.created_at,
    })
}

#[instrument(skip(state, user, payload))]
pub async fn save_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ConversationPayload>,
) -> Result<Json<ConversationRead>, ApiError> {
    let data = serde_json::to_string(&payload.conversation)
        .map_err(|e| ApiError::Internal(e.into()))?;
    let convo = Conversation::create(&state.db, user.id, &data).await?;

    info!(user_id = %user.id, conversation_id = %convo.id, "conversation saved");
    Ok(Json(read_view(convo)?))
}

#[instrument(skip(state, user))]
pub async fn list_conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ConversationRead>>, ApiError> {
    let rows = Conversation::list_by_user(&state.db, user.id).await?;
    let items = rows
        .into_iter()
        .map(read_view)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

#[instrument(skip(state, user))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = Conversation::delete(&state.db, user.id, id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Conversation not found".into()));
    }

    info!(user_id = %user.id, conversation_id = %id, "conversation deleted");
    Ok(Json(MessageResponse::new(
        "Conversation deleted successfully",
    )))
}
