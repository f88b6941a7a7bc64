//! crates/progress_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Title used when the title model fails or returns nothing usable.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Reply persisted in place of a model answer when generation fails.
pub const APOLOGY_REPLY: &str = "Sorry, I couldn't generate a response. Please try again.";

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Personal details the assistant uses to tailor its replies.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: Option<u32>,
    pub location: Option<Location>,
    pub voice: String,
    /// Replies are synthesized and played automatically when set.
    pub voice_mode_enabled: bool,
    /// Free-text notes the user wants the assistant to remember.
    pub memory: String,
}

/// A partial profile update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub location: Option<Location>,
    pub voice: Option<String>,
    pub voice_mode_enabled: Option<bool>,
    pub memory: Option<String>,
}

impl UserProfile {
    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(first_name) = update.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            self.last_name = last_name;
        }
        if let Some(age) = update.age {
            self.age = Some(age);
        }
        if let Some(location) = update.location {
            self.location = Some(location);
        }
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
        if let Some(enabled) = update.voice_mode_enabled {
            self.voice_mode_enabled = enabled;
        }
        if let Some(memory) = update.memory {
            self.memory = memory;
        }
    }
}

/// A named thread of messages owned by one user.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// Transient status of a message that only exists in live views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Thinking,
}

/// A single turn within a conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    /// Inline attachment as a data URI, e.g. an uploaded image.
    pub attachment_data_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Never persisted.
    pub status: Option<MessageStatus>,
}

/// Fields needed to persist a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub attachment_data_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackRating {
    Like,
    Dislike,
}

/// A user rating attached to a specific assistant message.
#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub message_content: String,
    pub rating: FeedbackRating,
    pub reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub message_content: String,
    pub rating: FeedbackRating,
    pub reason: Option<String>,
}

/// How the assistant should approach a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiMode {
    #[default]
    Standard,
    Search,
    ThinkDeep,
}

/// Everything the chat model needs to produce one reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub conversation_id: Uuid,
    pub message: String,
    pub attachment_data_uri: Option<String>,
    pub retrieved_context: Option<String>,
    pub profile: Option<UserProfile>,
    pub mode: AiMode,
}

//=========================================================================================
// String forms shared by the storage and wire layers
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl FeedbackRating {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackRating::Like => "like",
            FeedbackRating::Dislike => "dislike",
        }
    }
}

impl fmt::Display for FeedbackRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackRating {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(FeedbackRating::Like),
            "dislike" => Ok(FeedbackRating::Dislike),
            other => Err(ParseEnumError {
                kind: "rating",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            age: Some(36),
            location: None,
            voice: "alloy".to_string(),
            voice_mode_enabled: false,
            memory: String::new(),
        }
    }

    #[test]
    fn profile_update_only_touches_given_fields() {
        let mut p = profile();
        p.apply(ProfileUpdate {
            memory: Some("likes tea".to_string()),
            voice_mode_enabled: Some(true),
            ..Default::default()
        });
        assert_eq!(p.memory, "likes tea");
        assert!(p.voice_mode_enabled);
        assert_eq!(p.first_name, "Ada");
        assert_eq!(p.age, Some(36));
    }

    #[test]
    fn enums_parse_their_own_string_forms() {
        for role in [Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        for rating in [FeedbackRating::Like, FeedbackRating::Dislike] {
            assert_eq!(rating.as_str().parse::<FeedbackRating>(), Ok(rating));
        }
        assert!("system".parse::<Role>().is_err());
        assert!("meh".parse::<FeedbackRating>().is_err());
    }
}
