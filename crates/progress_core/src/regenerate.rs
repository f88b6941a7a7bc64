//! crates/progress_core/src/regenerate.rs
//!
//! Works out what a "regenerate" request touches: the most recent user turn
//! is asked again and every assistant reply after it is discarded.

use uuid::Uuid;

use crate::domain::{Message, MessageStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerationPlan {
    /// The user turn whose reply is regenerated.
    pub prompt_message_id: Uuid,
    pub prompt: String,
    pub attachment_data_uri: Option<String>,
    /// Assistant messages after the prompt, in list order.
    pub remove: Vec<Uuid>,
}

/// Plans a regeneration over `messages` in conversation order. Returns `None`
/// when the conversation has no user message yet. Thinking placeholders are
/// never scheduled for removal since they are not stored.
pub fn plan_regeneration(messages: &[Message]) -> Option<RegenerationPlan> {
    let last_user = messages.iter().rposition(|m| m.role == Role::User)?;
    let prompt = &messages[last_user];

    let remove = messages[last_user + 1..]
        .iter()
        .filter(|m| m.role == Role::Assistant && m.status != Some(MessageStatus::Thinking))
        .map(|m| m.id)
        .collect();

    Some(RegenerationPlan {
        prompt_message_id: prompt.id,
        prompt: prompt.content.clone(),
        attachment_data_uri: prompt.attachment_data_uri.clone(),
        remove,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(role: Role, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            role,
            content: content.to_string(),
            attachment_data_uri: None,
            created_at: Utc::now(),
            status: None,
        }
    }

    #[test]
    fn removes_exactly_the_replies_after_the_last_user_turn() {
        let history = vec![
            msg(Role::User, "first"),
            msg(Role::Assistant, "reply one"),
            msg(Role::User, "second"),
            msg(Role::Assistant, "reply two"),
            msg(Role::Assistant, "reply two, again"),
        ];
        let plan = plan_regeneration(&history).unwrap();
        assert_eq!(plan.prompt, "second");
        assert_eq!(plan.prompt_message_id, history[2].id);
        assert_eq!(plan.remove, vec![history[3].id, history[4].id]);
    }

    #[test]
    fn earlier_replies_are_kept() {
        let history = vec![msg(Role::User, "only"), msg(Role::Assistant, "answer")];
        let plan = plan_regeneration(&history).unwrap();
        assert_eq!(plan.remove, vec![history[1].id]);
        assert!(!plan.remove.contains(&history[0].id));
    }

    #[test]
    fn last_turn_without_reply_removes_nothing() {
        let mut with_attachment = msg(Role::User, "what is this?");
        with_attachment.attachment_data_uri = Some("data:image/png;base64,AAAA".to_string());
        let history = vec![msg(Role::Assistant, "hi"), with_attachment];
        let plan = plan_regeneration(&history).unwrap();
        assert!(plan.remove.is_empty());
        assert_eq!(plan.attachment_data_uri.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn no_user_message_means_no_plan() {
        assert!(plan_regeneration(&[]).is_none());
        assert!(plan_regeneration(&[msg(Role::Assistant, "welcome")]).is_none());
    }

    #[test]
    fn thinking_placeholder_is_not_removed() {
        let mut thinking = msg(Role::Assistant, "");
        thinking.status = Some(MessageStatus::Thinking);
        let history = vec![msg(Role::User, "q"), thinking];
        assert!(plan_regeneration(&history).unwrap().remove.is_empty());
    }
}
