//! crates/progress_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Conversation, Feedback, GenerationRequest, Message, NewFeedback, NewMessage, User,
    UserCredentials, UserProfile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    async fn create_password_reset(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Marks the reset as used and returns its user. Unknown, expired and
    /// already consumed tokens are `NotFound`.
    async fn consume_password_reset(&self, token_hash: &str) -> PortResult<Uuid>;

    // --- Profiles ---
    async fn create_profile(&self, profile: &UserProfile) -> PortResult<()>;

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    async fn save_profile(&self, profile: &UserProfile) -> PortResult<()>;

    // --- Conversations ---
    async fn create_conversation(&self, user_id: Uuid, title: &str) -> PortResult<Conversation>;

    /// Newest first.
    async fn list_conversations(&self, user_id: Uuid) -> PortResult<Vec<Conversation>>;

    /// `NotFound` when the conversation does not exist or belongs to someone else.
    async fn get_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> PortResult<Conversation>;

    async fn rename_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        title: &str,
    ) -> PortResult<Conversation>;

    /// Removes the conversation and every message in it.
    async fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> PortResult<()>;

    // --- Messages ---
    async fn create_message(&self, message: NewMessage) -> PortResult<Message>;

    /// Oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> PortResult<Vec<Message>>;

    async fn get_message(&self, conversation_id: Uuid, message_id: Uuid) -> PortResult<Message>;

    async fn update_message_content(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> PortResult<Message>;

    /// Returns how many of the given messages were actually removed.
    async fn delete_messages(&self, conversation_id: Uuid, message_ids: &[Uuid]) -> PortResult<u64>;

    // --- Feedback ---
    async fn save_feedback(&self, feedback: NewFeedback) -> PortResult<Feedback>;

    /// Newest first.
    async fn list_feedback(&self) -> PortResult<Vec<Feedback>>;
}

#[async_trait]
pub trait ChatModelService: Send + Sync {
    /// Produces the assistant's reply to one user turn.
    async fn generate_response(&self, request: &GenerationRequest) -> PortResult<String>;
}

#[async_trait]
pub trait TitleGenerationService: Send + Sync {
    /// Generates a short conversation title from its first message.
    async fn generate_title(&self, first_message: &str) -> PortResult<String>;
}

#[async_trait]
pub trait DocumentSummaryService: Send + Sync {
    async fn summarize_document(&self, document_data_uri: &str) -> PortResult<String>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes encoded audio (the container is given by `mime_type`) into text.
    async fn transcribe_audio(&self, audio_data: &[u8], mime_type: &str) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text. `voice` falls back to the
    /// adapter's default when absent or unknown.
    async fn generate_audio(&self, text: &str, voice: Option<&str>) -> PortResult<Vec<u8>>;

    /// MIME type of the audio returned by `generate_audio`.
    fn audio_mime_type(&self) -> &'static str;
}

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Returns the generated image as a data URI.
    async fn generate_image(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: &str, token: &str) -> PortResult<()>;
}
