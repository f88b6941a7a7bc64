//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Selected with
//! `DATABASE_URL=memory://` for local runs, and used by the test suite.
//! Nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::domain::{
    Conversation, Feedback, Message, NewFeedback, NewMessage, User, UserCredentials, UserProfile,
};
use progress_core::ports::{DatabaseService, PortError, PortResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

struct PasswordReset {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    password_resets: HashMap<String, PasswordReset>,
    profiles: HashMap<Uuid, UserProfile>,
    /// Insertion order doubles as the tie-breaker for equal timestamps.
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    feedback: Vec<Feedback>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conversation_not_found(conversation_id: Uuid) -> PortError {
    PortError::NotFound(format!("Conversation {} not found", conversation_id))
}

fn message_not_found(message_id: Uuid) -> PortError {
    PortError::NotFound(format!("Message {} not found", message_id))
}

#[async_trait]
impl DatabaseService for MemoryStore {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == email) {
            return Err(PortError::Conflict("Email already registered".to_string()));
        }
        let user_id = Uuid::new_v4();
        t.users.insert(
            user_id,
            UserCredentials {
                user_id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(User {
            user_id,
            email: email.to_string(),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let t = self.tables.read().await;
        t.users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let t = self.tables.read().await;
        t.users
            .get(&user_id)
            .map(|u| User {
                user_id: u.user_id,
                email: u.email.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        user.hashed_password = hashed_password.to_string();
        // A new password signs out every existing session.
        t.auth_sessions.retain(|_, (owner, _)| *owner != user_id);
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut t = self.tables.write().await;
        t.auth_sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let t = self.tables.read().await;
        match t.auth_sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn create_password_reset(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut t = self.tables.write().await;
        t.password_resets.insert(
            token_hash.to_string(),
            PasswordReset {
                user_id,
                expires_at,
                consumed: false,
            },
        );
        Ok(())
    }

    async fn consume_password_reset(&self, token_hash: &str) -> PortResult<Uuid> {
        let mut t = self.tables.write().await;
        match t.password_resets.get_mut(token_hash) {
            Some(reset) if !reset.consumed && reset.expires_at > Utc::now() => {
                reset.consumed = true;
                Ok(reset.user_id)
            }
            _ => Err(PortError::NotFound("Reset token not found".to_string())),
        }
    }

    async fn create_profile(&self, profile: &UserProfile) -> PortResult<()> {
        let mut t = self.tables.write().await;
        if t.profiles.contains_key(&profile.user_id) {
            return Err(PortError::Conflict("Profile already exists".to_string()));
        }
        t.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let t = self.tables.read().await;
        t.profiles
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile for user {} not found", user_id)))
    }

    async fn save_profile(&self, profile: &UserProfile) -> PortResult<()> {
        let mut t = self.tables.write().await;
        match t.profiles.get_mut(&profile.user_id) {
            Some(stored) => {
                *stored = profile.clone();
                Ok(())
            }
            None => Err(PortError::NotFound(format!(
                "Profile for user {} not found",
                profile.user_id
            ))),
        }
    }

    async fn create_conversation(&self, user_id: Uuid, title: &str) -> PortResult<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .conversations
            .push(conversation.clone());
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: Uuid) -> PortResult<Vec<Conversation>> {
        let t = self.tables.read().await;
        let mut list: Vec<Conversation> = t
            .conversations
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn get_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> PortResult<Conversation> {
        let t = self.tables.read().await;
        t.conversations
            .iter()
            .find(|c| c.id == conversation_id && c.user_id == user_id)
            .cloned()
            .ok_or_else(|| conversation_not_found(conversation_id))
    }

    async fn rename_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        title: &str,
    ) -> PortResult<Conversation> {
        let mut t = self.tables.write().await;
        let conversation = t
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id && c.user_id == user_id)
            .ok_or_else(|| conversation_not_found(conversation_id))?;
        conversation.title = title.to_string();
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> PortResult<()> {
        let mut t = self.tables.write().await;
        let before = t.conversations.len();
        t.conversations
            .retain(|c| !(c.id == conversation_id && c.user_id == user_id));
        if t.conversations.len() == before {
            return Err(conversation_not_found(conversation_id));
        }
        t.messages.retain(|m| m.conversation_id != conversation_id);
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> PortResult<Message> {
        let mut t = self.tables.write().await;
        if !t.conversations.iter().any(|c| c.id == message.conversation_id) {
            return Err(conversation_not_found(message.conversation_id));
        }
        let stored = Message {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            attachment_data_uri: message.attachment_data_uri,
            created_at: Utc::now(),
            status: None,
        };
        t.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> PortResult<Vec<Message>> {
        let t = self.tables.read().await;
        let mut list: Vec<Message> = t
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn get_message(&self, conversation_id: Uuid, message_id: Uuid) -> PortResult<Message> {
        let t = self.tables.read().await;
        t.messages
            .iter()
            .find(|m| m.id == message_id && m.conversation_id == conversation_id)
            .cloned()
            .ok_or_else(|| message_not_found(message_id))
    }

    async fn update_message_content(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> PortResult<Message> {
        let mut t = self.tables.write().await;
        let message = t
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.conversation_id == conversation_id)
            .ok_or_else(|| message_not_found(message_id))?;
        message.content = content.to_string();
        Ok(message.clone())
    }

    async fn delete_messages(&self, conversation_id: Uuid, message_ids: &[Uuid]) -> PortResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.messages.len();
        t.messages
            .retain(|m| !(m.conversation_id == conversation_id && message_ids.contains(&m.id)));
        Ok((before - t.messages.len()) as u64)
    }

    async fn save_feedback(&self, feedback: NewFeedback) -> PortResult<Feedback> {
        let stored = Feedback {
            id: Uuid::new_v4(),
            user_id: feedback.user_id,
            conversation_id: feedback.conversation_id,
            message_id: feedback.message_id,
            message_content: feedback.message_content,
            rating: feedback.rating,
            reason: feedback.reason,
            submitted_at: Utc::now(),
        };
        self.tables.write().await.feedback.push(stored.clone());
        Ok(stored)
    }

    async fn list_feedback(&self) -> PortResult<Vec<Feedback>> {
        let t = self.tables.read().await;
        let mut list: Vec<Feedback> = t.feedback.iter().rev().cloned().collect();
        list.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::domain::Role;

    async fn conversation_with(store: &MemoryStore, user_id: Uuid, contents: &[(Role, &str)]) -> Uuid {
        let conversation = store.create_conversation(user_id, "Test").await.unwrap();
        for (role, content) in contents {
            store
                .create_message(NewMessage {
                    conversation_id: conversation.id,
                    role: *role,
                    content: content.to_string(),
                    attachment_data_uri: None,
                })
                .await
                .unwrap();
        }
        conversation.id
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let store = MemoryStore::new();
        store.create_user_with_email("a@example.com", "hash").await.unwrap();
        let err = store.create_user_with_email("a@example.com", "hash").await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_sessions_do_not_validate() {
        let store = MemoryStore::new();
        let user = store.create_user_with_email("a@example.com", "hash").await.unwrap();
        store
            .create_auth_session("old", user.user_id, Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        store
            .create_auth_session("new", user.user_id, Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(matches!(store.validate_auth_session("old").await, Err(PortError::Unauthorized)));
        assert_eq!(store.validate_auth_session("new").await.unwrap(), user.user_id);
    }

    #[tokio::test]
    async fn reset_tokens_are_single_use() {
        let store = MemoryStore::new();
        let user = store.create_user_with_email("a@example.com", "hash").await.unwrap();
        store
            .create_password_reset("digest", user.user_id, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.consume_password_reset("digest").await.unwrap(), user.user_id);
        assert!(store.consume_password_reset("digest").await.is_err());
    }

    #[tokio::test]
    async fn deleting_a_conversation_cascades_to_messages() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let id = conversation_with(&store, user_id, &[(Role::User, "hi"), (Role::Assistant, "hello")]).await;
        assert_eq!(store.list_messages(id).await.unwrap().len(), 2);

        store.delete_conversation(user_id, id).await.unwrap();
        assert!(store.list_messages(id).await.unwrap().is_empty());
        assert!(store.get_conversation(user_id, id).await.is_err());
    }

    #[tokio::test]
    async fn conversations_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let (owner, stranger) = (Uuid::new_v4(), Uuid::new_v4());
        let id = conversation_with(&store, owner, &[]).await;
        assert!(store.get_conversation(stranger, id).await.is_err());
        assert!(store.delete_conversation(stranger, id).await.is_err());
        assert!(store.list_conversations(stranger).await.unwrap().is_empty());
        assert_eq!(store.list_conversations(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_messages_only_touches_the_given_conversation() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let a = conversation_with(&store, user_id, &[(Role::User, "a")]).await;
        let b = conversation_with(&store, user_id, &[(Role::User, "b")]).await;
        let b_ids: Vec<Uuid> = store.list_messages(b).await.unwrap().iter().map(|m| m.id).collect();

        assert_eq!(store.delete_messages(a, &b_ids).await.unwrap(), 0);
        assert_eq!(store.delete_messages(b, &b_ids).await.unwrap(), 1);
    }
}
