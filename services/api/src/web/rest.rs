//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, plus the response
//! payloads shared by several groups of REST handlers and the WebSocket.

use chrono::{DateTime, Utc};
use progress_core::domain::{Conversation, Message};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{auth, conversations, feedback, media, messages, profile};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::request_password_reset_handler,
        auth::confirm_password_reset_handler,
        profile::get_profile_handler,
        profile::update_profile_handler,
        profile::get_memory_handler,
        profile::update_memory_handler,
        conversations::list_conversations_handler,
        conversations::create_conversation_handler,
        conversations::get_conversation_handler,
        conversations::rename_conversation_handler,
        conversations::delete_conversation_handler,
        messages::list_messages_handler,
        messages::send_message_handler,
        messages::edit_message_handler,
        messages::regenerate_handler,
        feedback::submit_feedback_handler,
        feedback::list_feedback_handler,
        media::synthesize_speech_handler,
        media::transcribe_speech_handler,
        media::generate_image_handler,
        media::summarize_document_handler,
    ),
    components(
        schemas(
            ConversationResponse,
            MessageResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::PasswordResetRequest,
            auth::PasswordResetConfirmRequest,
            profile::LocationDto,
            profile::ProfileResponse,
            profile::UpdateProfileRequest,
            profile::MemoryDto,
            conversations::CreateConversationRequest,
            conversations::CreateConversationResponse,
            conversations::RenameConversationRequest,
            messages::ChatMode,
            messages::SendMessageRequest,
            messages::SendMessageResponse,
            messages::EditMessageRequest,
            messages::RegenerateRequest,
            messages::RegenerateResponse,
            feedback::RatingDto,
            feedback::FeedbackRequest,
            feedback::FeedbackResponse,
            media::SynthesizeRequest,
            media::SynthesizeResponse,
            media::TranscribeRequest,
            media::TranscribeResponse,
            media::ImageRequest,
            media::ImageResponse,
            media::SummarizeRequest,
            media::SummarizeResponse,
        )
    ),
    tags(
        (name = "Progress API", description = "Chat, profile, feedback and media endpoints for the Progress assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            created_at: conversation.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_data_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            role: message.role.as_str().to_string(),
            content: message.content,
            attachment_data_uri: message.attachment_data_uri,
            created_at: message.created_at,
        }
    }
}
