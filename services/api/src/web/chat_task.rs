//! services/api/src/web/chat_task.rs
//!
//! The chat workflows behind the message endpoints: sending a turn, generating
//! the assistant's reply, regenerating the last reply and editing a message.
//! Every change is persisted first and then published to live sessions.

use axum::http::StatusCode;
use progress_core::audio::Clip;
use progress_core::data_uri::{DataUri, DataUriError};
use progress_core::domain::{
    AiMode, Conversation, GenerationRequest, Message, NewMessage, Role, APOLOGY_REPLY,
    DEFAULT_CONVERSATION_TITLE,
};
use progress_core::ports::PortError;
use progress_core::regenerate::plan_regeneration;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{port_rejection, HandlerError};
use crate::web::events::ConversationEvent;
use crate::web::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("A response is already being generated for this conversation")]
    Busy,
    #[error("Message must contain text or an attachment")]
    EmptyMessage,
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(#[from] DataUriError),
    #[error("There is no message to regenerate a response for")]
    NothingToRegenerate,
    #[error(transparent)]
    Port(#[from] PortError),
}

impl ChatError {
    pub fn rejection(&self) -> HandlerError {
        match self {
            ChatError::Busy => (StatusCode::CONFLICT, self.to_string()),
            ChatError::EmptyMessage | ChatError::InvalidAttachment(_) | ChatError::NothingToRegenerate => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ChatError::Port(e) => port_rejection(e),
        }
    }
}

/// A freshly generated assistant message.
#[derive(Debug)]
pub struct Reply {
    pub message: Message,
    /// Synthesized speech for the reply when the user has voice mode on.
    pub audio_data_uri: Option<String>,
}

#[derive(Debug)]
pub struct SendOutcome {
    pub conversation: Conversation,
    pub user_message: Message,
    pub reply: Reply,
}

#[derive(Debug)]
pub struct RegenerateOutcome {
    pub removed: Vec<Uuid>,
    pub reply: Reply,
}

/// Persists a user turn and answers it. Without a `conversation_id`, a new
/// conversation is started and titled after the message.
pub async fn send_message(
    state: &Arc<AppState>,
    user_id: Uuid,
    conversation_id: Option<Uuid>,
    content: String,
    attachment_data_uri: Option<String>,
    mode: AiMode,
) -> Result<SendOutcome, ChatError> {
    let content = content.trim().to_string();
    if content.is_empty() && attachment_data_uri.is_none() {
        return Err(ChatError::EmptyMessage);
    }
    if let Some(uri) = &attachment_data_uri {
        DataUri::parse_image(uri)?;
    }

    let conversation = match conversation_id {
        Some(id) => state.db.get_conversation(user_id, id).await?,
        None => {
            let title = title_for(state, &content).await;
            let conversation = state.db.create_conversation(user_id, &title).await?;
            info!("Created conversation {} for user {}", conversation.id, user_id);
            conversation
        }
    };

    let _guard = state
        .generation_gate
        .try_acquire(conversation.id)
        .map_err(|_| ChatError::Busy)?;

    let user_message = state
        .db
        .create_message(NewMessage {
            conversation_id: conversation.id,
            role: Role::User,
            content: content.clone(),
            attachment_data_uri: attachment_data_uri.clone(),
        })
        .await?;
    state.events.publish(
        conversation.id,
        ConversationEvent::MessageAdded(user_message.clone()),
    );

    let reply = generate_reply(state, user_id, conversation.id, content, attachment_data_uri, mode).await?;

    Ok(SendOutcome {
        conversation,
        user_message,
        reply,
    })
}

async fn title_for(state: &AppState, first_message: &str) -> String {
    if first_message.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }
    match state.title_adapter.generate_title(first_message).await {
        Ok(title) if !title.trim().is_empty() => title,
        Ok(_) => DEFAULT_CONVERSATION_TITLE.to_string(),
        Err(e) => {
            warn!("Title generation failed, using the default title: {:?}", e);
            DEFAULT_CONVERSATION_TITLE.to_string()
        }
    }
}

/// Asks the chat model for a reply to `prompt` and stores it. Model failures
/// are answered with an apology rather than an error.
pub async fn generate_reply(
    state: &Arc<AppState>,
    user_id: Uuid,
    conversation_id: Uuid,
    prompt: String,
    attachment_data_uri: Option<String>,
    mode: AiMode,
) -> Result<Reply, ChatError> {
    let placeholder_id = Uuid::new_v4();
    state
        .events
        .publish(conversation_id, ConversationEvent::ThinkingStarted { placeholder_id });

    let profile = match state.db.get_profile(user_id).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!("Generating without a profile for user {}: {:?}", user_id, e);
            None
        }
    };

    let request = GenerationRequest {
        conversation_id,
        message: prompt,
        attachment_data_uri,
        retrieved_context: None,
        profile: profile.clone(),
        mode,
    };

    let content = match state.chat_adapter.generate_response(&request).await {
        Ok(text) => text,
        Err(e) => {
            error!("Chat generation failed for conversation {}: {:?}", conversation_id, e);
            APOLOGY_REPLY.to_string()
        }
    };

    let stored = state
        .db
        .create_message(NewMessage {
            conversation_id,
            role: Role::Assistant,
            content,
            attachment_data_uri: None,
        })
        .await;
    state
        .events
        .publish(conversation_id, ConversationEvent::ThinkingCleared { placeholder_id });
    let message = stored?;
    state
        .events
        .publish(conversation_id, ConversationEvent::MessageAdded(message.clone()));

    let audio_data_uri = match profile.filter(|p| p.voice_mode_enabled) {
        Some(profile) => speak_reply(state, &message, &profile.voice).await,
        None => None,
    };

    Ok(Reply {
        message,
        audio_data_uri,
    })
}

async fn speak_reply(state: &AppState, message: &Message, voice: &str) -> Option<String> {
    match state.tts_adapter.generate_audio(&message.content, Some(voice)).await {
        Ok(bytes) => {
            let mime_type = state.tts_adapter.audio_mime_type();
            let data_uri = DataUri::encode(mime_type, &bytes);
            state.events.publish(
                message.conversation_id,
                ConversationEvent::ReplyAudio(Clip {
                    message_id: message.id,
                    mime_type: mime_type.to_string(),
                    bytes: Arc::new(bytes),
                }),
            );
            Some(data_uri)
        }
        Err(e) => {
            warn!("Voice mode synthesis failed for message {}: {:?}", message.id, e);
            None
        }
    }
}

/// Drops the replies after the most recent user turn and asks again.
pub async fn regenerate(
    state: &Arc<AppState>,
    user_id: Uuid,
    conversation_id: Uuid,
    mode: AiMode,
) -> Result<RegenerateOutcome, ChatError> {
    state.db.get_conversation(user_id, conversation_id).await?;
    let _guard = state
        .generation_gate
        .try_acquire(conversation_id)
        .map_err(|_| ChatError::Busy)?;

    let messages = state.db.list_messages(conversation_id).await?;
    let plan = plan_regeneration(&messages).ok_or(ChatError::NothingToRegenerate)?;

    if !plan.remove.is_empty() {
        let deleted = state.db.delete_messages(conversation_id, &plan.remove).await?;
        info!(
            "Removed {} message(s) from conversation {} before regenerating",
            deleted, conversation_id
        );
        state.events.publish(
            conversation_id,
            ConversationEvent::MessagesRemoved(plan.remove.clone()),
        );
    }

    let reply = generate_reply(
        state,
        user_id,
        conversation_id,
        plan.prompt,
        plan.attachment_data_uri,
        mode,
    )
    .await?;

    Ok(RegenerateOutcome {
        removed: plan.remove,
        reply,
    })
}

/// Overwrites the content of one message in place.
pub async fn edit_message(
    state: &Arc<AppState>,
    user_id: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
    content: &str,
) -> Result<Message, ChatError> {
    state.db.get_conversation(user_id, conversation_id).await?;
    let message = state
        .db
        .update_message_content(conversation_id, message_id, content)
        .await?;
    state
        .events
        .publish(conversation_id, ConversationEvent::MessageUpdated(message.clone()));
    Ok(message)
}
