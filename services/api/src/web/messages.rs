//! services/api/src/web/messages.rs
//!
//! Message endpoints: list, send, edit and regenerate.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use progress_core::domain::AiMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_rejection, HandlerError};
use crate::web::chat_task::{self, SendOutcome};
use crate::web::rest::MessageResponse;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    Standard,
    Search,
    ThinkDeep,
}

impl From<ChatMode> for AiMode {
    fn from(mode: ChatMode) -> Self {
        match mode {
            ChatMode::Standard => AiMode::Standard,
            ChatMode::Search => AiMode::Search,
            ChatMode::ThinkDeep => AiMode::ThinkDeep,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    pub attachment_data_uri: Option<String>,
    #[serde(default)]
    pub mode: ChatMode,
}

#[derive(Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub conversation_id: Uuid,
    pub user_message: MessageResponse,
    pub assistant_message: MessageResponse,
    /// Speech for the reply, present when voice mode is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_data_uri: Option<String>,
}

impl From<SendOutcome> for SendMessageResponse {
    fn from(outcome: SendOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation.id,
            user_message: outcome.user_message.into(),
            assistant_message: outcome.reply.message.into(),
            audio_data_uri: outcome.reply.audio_data_uri,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub mode: ChatMode,
}

#[derive(Serialize, ToSchema)]
pub struct RegenerateResponse {
    /// Ids of the replies that were discarded.
    pub removed_message_ids: Vec<Uuid>,
    pub assistant_message: MessageResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_data_uri: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/conversations/{id}/messages",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageResponse]),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let result = async {
        state.db.get_conversation(user_id, conversation_id).await?;
        state.db.list_messages(conversation_id).await
    }
    .await;

    match result {
        Ok(messages) => Ok(Json(
            messages
                .into_iter()
                .map(MessageResponse::from)
                .collect::<Vec<_>>(),
        )),
        Err(e) => {
            error!("Failed to list messages of {}: {:?}", conversation_id, e);
            Err(port_rejection(&e))
        }
    }
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored and answered", body = SendMessageResponse),
        (status = 400, description = "Empty message or invalid attachment"),
        (status = 404, description = "Conversation not found"),
        (status = 409, description = "A reply is already being generated")
    )
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let outcome = chat_task::send_message(
        &state,
        user_id,
        Some(conversation_id),
        req.content,
        req.attachment_data_uri,
        req.mode.into(),
    )
    .await
    .map_err(|e| {
        error!("Failed to send message to {}: {:?}", conversation_id, e);
        e.rejection()
    })?;

    Ok((StatusCode::CREATED, Json(SendMessageResponse::from(outcome))))
}

#[utoipa::path(
    patch,
    path = "/conversations/{id}/messages/{message_id}",
    params(
        ("id" = Uuid, Path, description = "Conversation id"),
        ("message_id" = Uuid, Path, description = "Message id")
    ),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "The edited message", body = MessageResponse),
        (status = 400, description = "Empty content"),
        (status = 404, description = "Conversation or message not found")
    )
)]
pub async fn edit_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message content cannot be empty".to_string()));
    }
    let message = chat_task::edit_message(&state, user_id, conversation_id, message_id, &req.content)
        .await
        .map_err(|e| {
            error!("Failed to edit message {}: {:?}", message_id, e);
            e.rejection()
        })?;
    Ok(Json(MessageResponse::from(message)))
}

#[utoipa::path(
    post,
    path = "/conversations/{id}/regenerate",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = RegenerateRequest,
    responses(
        (status = 201, description = "Reply regenerated", body = RegenerateResponse),
        (status = 400, description = "No user message to answer"),
        (status = 404, description = "Conversation not found"),
        (status = 409, description = "A reply is already being generated")
    )
)]
pub async fn regenerate_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<RegenerateRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let outcome = chat_task::regenerate(&state, user_id, conversation_id, req.mode.into())
        .await
        .map_err(|e| {
            error!("Failed to regenerate in {}: {:?}", conversation_id, e);
            e.rejection()
        })?;

    Ok((
        StatusCode::CREATED,
        Json(RegenerateResponse {
            removed_message_ids: outcome.removed,
            assistant_message: outcome.reply.message.into(),
            audio_data_uri: outcome.reply.audio_data_uri,
        }),
    ))
}
