//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::domain::{
    Conversation, Feedback, FeedbackRating, Location, Message, NewFeedback, NewMessage,
    ParseEnumError, Role, User, UserCredentials, UserProfile,
};
use progress_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => unexpected(e),
    }
}

fn age_column(age: Option<u32>) -> PortResult<Option<i32>> {
    age.map(i32::try_from)
        .transpose()
        .map_err(|_| PortError::Unexpected("Age does not fit the profiles table".to_string()))
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn has_code(e: &sqlx::Error, code: &str) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|c| c == code)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    age: Option<i32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    voice: String,
    voice_mode_enabled: bool,
    memory: String,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location {
                latitude,
                longitude,
            }),
            _ => None,
        };
        UserProfile {
            user_id: self.user_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            age: self.age.and_then(|a| u32::try_from(a).ok()),
            location,
            voice: self.voice,
            voice_mode_enabled: self.voice_mode_enabled,
            memory: self.memory,
        }
    }
}

#[derive(FromRow)]
struct ConversationRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
}
impl ConversationRecord {
    fn to_domain(self) -> Conversation {
        Conversation {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    role: String,
    content: String,
    attachment_data_uri: Option<String>,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        let role: Role = self
            .role
            .parse()
            .map_err(|e: ParseEnumError| PortError::Unexpected(e.to_string()))?;
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            role,
            content: self.content,
            attachment_data_uri: self.attachment_data_uri,
            created_at: self.created_at,
            status: None,
        })
    }
}

#[derive(FromRow)]
struct FeedbackRecord {
    id: Uuid,
    user_id: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
    message_content: String,
    rating: String,
    reason: Option<String>,
    submitted_at: DateTime<Utc>,
}
impl FeedbackRecord {
    fn to_domain(self) -> PortResult<Feedback> {
        let rating: FeedbackRating = self
            .rating
            .parse()
            .map_err(|e: ParseEnumError| PortError::Unexpected(e.to_string()))?;
        Ok(Feedback {
            id: self.id,
            user_id: self.user_id,
            conversation_id: self.conversation_id,
            message_id: self.message_id,
            message_content: self.message_content,
            rating,
            reason: self.reason,
            submitted_at: self.submitted_at,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, attachment_data_uri, created_at";
const PROFILE_COLUMNS: &str =
    "user_id, first_name, last_name, email, age, latitude, longitude, voice, voice_mode_enabled, memory";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Auth Methods ---

    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(email)
            .bind(hashed_password)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if has_code(&e, UNIQUE_VIOLATION) {
                    PortError::Conflict("Email already registered".to_string())
                } else {
                    unexpected(e)
                }
            })?;

        Ok(User {
            user_id,
            email: email.to_string(),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("User with email {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("User {} not found", user_id)))?;
        Ok(User {
            user_id: record.user_id,
            email: record.email,
        })
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let result = sqlx::query("UPDATE users SET hashed_password = $1 WHERE user_id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        // A new password signs out every existing session.
        sqlx::query("DELETE FROM auth_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_password_reset(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn consume_password_reset(&self, token_hash: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE password_resets SET consumed_at = NOW() \
             WHERE token_hash = $1 AND consumed_at IS NULL AND expires_at > NOW() \
             RETURNING user_id",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or_else(|| PortError::NotFound("Reset token not found".to_string()))
    }

    // --- Profiles ---

    async fn create_profile(&self, profile: &UserProfile) -> PortResult<()> {
        sqlx::query(&format!(
            "INSERT INTO profiles ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            PROFILE_COLUMNS
        ))
        .bind(profile.user_id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(age_column(profile.age)?)
        .bind(profile.location.map(|l| l.latitude))
        .bind(profile.location.map(|l| l.longitude))
        .bind(&profile.voice)
        .bind(profile.voice_mode_enabled)
        .bind(&profile.memory)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if has_code(&e, UNIQUE_VIOLATION) {
                PortError::Conflict("Profile already exists".to_string())
            } else {
                unexpected(e)
            }
        })?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {} FROM profiles WHERE user_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("Profile for user {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn save_profile(&self, profile: &UserProfile) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE profiles SET first_name = $2, last_name = $3, email = $4, age = $5, \
             latitude = $6, longitude = $7, voice = $8, voice_mode_enabled = $9, memory = $10 \
             WHERE user_id = $1",
        )
        .bind(profile.user_id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(age_column(profile.age)?)
        .bind(profile.location.map(|l| l.latitude))
        .bind(profile.location.map(|l| l.longitude))
        .bind(&profile.voice)
        .bind(profile.voice_mode_enabled)
        .bind(&profile.memory)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Profile for user {} not found",
                profile.user_id
            )));
        }
        Ok(())
    }

    // --- Conversations ---

    async fn create_conversation(&self, user_id: Uuid, title: &str) -> PortResult<Conversation> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "INSERT INTO conversations (id, user_id, title) VALUES ($1, $2, $3) \
             RETURNING id, user_id, title, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_conversations(&self, user_id: Uuid) -> PortResult<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, user_id, title, created_at FROM conversations \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> PortResult<Conversation> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, user_id, title, created_at FROM conversations WHERE id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("Conversation {} not found", conversation_id)))?;
        Ok(record.to_domain())
    }

    async fn rename_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        title: &str,
    ) -> PortResult<Conversation> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "UPDATE conversations SET title = $3 WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, title, created_at",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("Conversation {} not found", conversation_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }
        Ok(())
    }

    // --- Messages ---

    async fn create_message(&self, message: NewMessage) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages (id, conversation_id, role, content, attachment_data_uri) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.attachment_data_uri)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if has_code(&e, FOREIGN_KEY_VIOLATION) {
                PortError::NotFound(format!("Conversation {} not found", message.conversation_id))
            } else {
                unexpected(e)
            }
        })?;
        record.to_domain()
    }

    async fn list_messages(&self, conversation_id: Uuid) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_message(&self, conversation_id: Uuid, message_id: Uuid) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM messages WHERE id = $1 AND conversation_id = $2",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("Message {} not found", message_id)))?;
        record.to_domain()
    }

    async fn update_message_content(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "UPDATE messages SET content = $3 WHERE id = $1 AND conversation_id = $2 RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .bind(conversation_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or(format!("Message {} not found", message_id)))?;
        record.to_domain()
    }

    async fn delete_messages(&self, conversation_id: Uuid, message_ids: &[Uuid]) -> PortResult<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = $1 AND id = ANY($2)")
            .bind(conversation_id)
            .bind(message_ids)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    // --- Feedback ---

    async fn save_feedback(&self, feedback: NewFeedback) -> PortResult<Feedback> {
        let record = sqlx::query_as::<_, FeedbackRecord>(
            "INSERT INTO feedback (id, user_id, conversation_id, message_id, message_content, rating, reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, conversation_id, message_id, message_content, rating, reason, submitted_at",
        )
        .bind(Uuid::new_v4())
        .bind(feedback.user_id)
        .bind(feedback.conversation_id)
        .bind(feedback.message_id)
        .bind(&feedback.message_content)
        .bind(feedback.rating.as_str())
        .bind(&feedback.reason)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn list_feedback(&self) -> PortResult<Vec<Feedback>> {
        let records = sqlx::query_as::<_, FeedbackRecord>(
            "SELECT id, user_id, conversation_id, message_id, message_content, rating, reason, submitted_at \
             FROM feedback ORDER BY submitted_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ages_are_stored_without_wrapping() {
        assert_eq!(age_column(Some(42)).unwrap(), Some(42));
        assert_eq!(age_column(None).unwrap(), None);
        assert!(matches!(age_column(Some(u32::MAX)), Err(PortError::Unexpected(_))));
    }
}
