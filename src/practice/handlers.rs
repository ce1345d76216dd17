use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, instrument};

use crate::{
    auth::jwt::CurrentUser,
    conversations::dto::ConversationPayload,
    error::ApiError,
    practice::{
        dto::{FeedbackResponse, TranscriptionResponse, TtsRequest},
        services::final_feedback,
    },
    speech::resolve_voice,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/practice/final-feedback", post(get_final_feedback))
        .route("/text-to-speech", post(text_to_speech))
        .route("/speech-to-text", post(speech_to_text))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB audio uploads
}

#[instrument(skip(state, payload))]
pub async fn get_final_feedback(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Json(payload): Json<ConversationPayload>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    if payload.conversation.is_empty() {
        return Err(ApiError::Validation(
            "Conversation history cannot be empty.".into(),
        ));
    }
    let feedback = final_feedback(state.ai.as_ref(), &payload.conversation).await;
    Ok(Json(feedback))
}

#[instrument(skip(state, payload))]
pub async fn text_to_speech(
    State(state): State<AppState>,
    Json(payload): Json<TtsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::Validation("Text cannot be empty.".into()));
    }

    let voice = resolve_voice(payload.voice.as_deref());
    let audio = state
        .speech
        .synthesize(&payload.text, voice)
        .await
        .map_err(|e| {
            error!(error = %e, voice = %voice, "speech synthesis failed");
            ApiError::Upstream("Failed to generate speech audio.".into())
        })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}

#[instrument(skip(state, multipart))]
pub async fn speech_to_text(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let mut audio: Option<Bytes> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("audio_file") {
            audio = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("invalid upload: {e}")))?,
            );
        }
    }
    let audio = audio.ok_or_else(|| ApiError::Validation("audio_file is required".into()))?;

    let transcription = state.speech.transcribe(audio).await.map_err(|e| {
        error!(error = %e, "transcription failed");
        ApiError::Upstream(e.to_string())
    })?;

    Ok(Json(TranscriptionResponse { transcription }))
}
