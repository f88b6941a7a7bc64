//! services/api/src/web/conversations.rs
//!
//! Conversation endpoints: list, create, read, rename and delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use progress_core::domain::DEFAULT_CONVERSATION_TITLE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_rejection, HandlerError};
use crate::web::chat_task;
use crate::web::messages::{ChatMode, SendMessageResponse};
use crate::web::rest::ConversationResponse;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// Starts an empty conversation, or one that opens with `content`.
#[derive(Deserialize, ToSchema, Default)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub attachment_data_uri: Option<String>,
    #[serde(default)]
    pub mode: ChatMode,
}

#[derive(Serialize, ToSchema)]
pub struct CreateConversationResponse {
    pub conversation: ConversationResponse,
    /// The first exchange, when the request carried a message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<SendMessageResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct RenameConversationRequest {
    pub title: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/conversations",
    responses(
        (status = 200, description = "The user's conversations, newest first", body = [ConversationResponse]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let conversations = state.db.list_conversations(user_id).await.map_err(|e| {
        error!("Failed to list conversations: {:?}", e);
        port_rejection(&e)
    })?;
    Ok(Json(
        conversations
            .into_iter()
            .map(ConversationResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    post,
    path = "/conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = CreateConversationResponse),
        (status = 400, description = "Invalid attachment")
    )
)]
pub async fn create_conversation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let has_message =
        req.content.as_deref().is_some_and(|c| !c.trim().is_empty()) || req.attachment_data_uri.is_some();

    if has_message {
        let outcome = chat_task::send_message(
            &state,
            user_id,
            None,
            req.content.unwrap_or_default(),
            req.attachment_data_uri,
            req.mode.into(),
        )
        .await
        .map_err(|e| {
            error!("Failed to start conversation: {:?}", e);
            e.rejection()
        })?;
        let conversation = ConversationResponse::from(outcome.conversation.clone());
        return Ok((
            StatusCode::CREATED,
            Json(CreateConversationResponse {
                conversation,
                exchange: Some(SendMessageResponse::from(outcome)),
            }),
        ));
    }

    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string());
    let conversation = state
        .db
        .create_conversation(user_id, &title)
        .await
        .map_err(|e| {
            error!("Failed to create conversation: {:?}", e);
            port_rejection(&e)
        })?;
    info!("Created conversation {} for user {}", conversation.id, user_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation: conversation.into(),
            exchange: None,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/conversations/{id}",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "The conversation", body = ConversationResponse),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn get_conversation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let conversation = state
        .db
        .get_conversation(user_id, conversation_id)
        .await
        .map_err(|e| port_rejection(&e))?;
    Ok(Json(ConversationResponse::from(conversation)))
}

#[utoipa::path(
    patch,
    path = "/conversations/{id}",
    params(("id" = Uuid, Path, description = "Conversation id")),
    request_body = RenameConversationRequest,
    responses(
        (status = 200, description = "Renamed conversation", body = ConversationResponse),
        (status = 400, description = "Empty title"),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn rename_conversation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Title cannot be empty".to_string()));
    }
    let conversation = state
        .db
        .rename_conversation(user_id, conversation_id, title)
        .await
        .map_err(|e| {
            error!("Failed to rename conversation {}: {:?}", conversation_id, e);
            port_rejection(&e)
        })?;
    Ok(Json(ConversationResponse::from(conversation)))
}

#[utoipa::path(
    delete,
    path = "/conversations/{id}",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 204, description = "Conversation and its messages deleted"),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn delete_conversation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .db
        .delete_conversation(user_id, conversation_id)
        .await
        .map_err(|e| {
            error!("Failed to delete conversation {}: {:?}", conversation_id, e);
            port_rejection(&e)
        })?;
    info!("Deleted conversation {}", conversation_id);
    Ok(StatusCode::NO_CONTENT)
}
