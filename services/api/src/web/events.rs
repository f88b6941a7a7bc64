//! services/api/src/web/events.rs
//!
//! Per-conversation fan-out of changes to every open WebSocket session.

use progress_core::audio::Clip;
use progress_core::domain::Message;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Events buffered per conversation before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum ConversationEvent {
    MessageAdded(Message),
    MessageUpdated(Message),
    MessagesRemoved(Vec<Uuid>),
    /// A reply is being generated. The placeholder is never stored.
    ThinkingStarted { placeholder_id: Uuid },
    ThinkingCleared { placeholder_id: Uuid },
    /// Voice mode synthesized this reply; sessions should play it right away.
    ReplyAudio(Clip),
}

#[derive(Default)]
pub struct EventHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<ConversationEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<Uuid, broadcast::Sender<ConversationEvent>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<ConversationEvent> {
        self.channels()
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Forgets the channel of a conversation once no session listens to it.
    /// Call after dropping the receiver returned by `subscribe`.
    pub fn unsubscribe(&self, conversation_id: Uuid) {
        let mut channels = self.channels();
        let idle = channels
            .get(&conversation_id)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if idle {
            channels.remove(&conversation_id);
            debug!("Dropped idle event channel for conversation {}", conversation_id);
        }
    }

    /// Delivers `event` to every current subscriber of the conversation.
    /// Returns how many sessions received it.
    pub fn publish(&self, conversation_id: Uuid, event: ConversationEvent) -> usize {
        let mut channels = self.channels();
        let Some(sender) = channels.get(&conversation_id) else {
            return 0;
        };
        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                // Everyone unsubscribed.
                channels.remove(&conversation_id);
                debug!("Dropped idle event channel for conversation {}", conversation_id);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_only_subscribers_of_that_conversation() {
        let hub = EventHub::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rx_a = hub.subscribe(a);
        let mut rx_b = hub.subscribe(b);

        let removed = vec![Uuid::new_v4()];
        assert_eq!(hub.publish(a, ConversationEvent::MessagesRemoved(removed.clone())), 1);

        match rx_a.recv().await.unwrap() {
            ConversationEvent::MessagesRemoved(ids) => assert_eq!(ids, removed),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        assert_eq!(hub.publish(id, ConversationEvent::MessagesRemoved(Vec::new())), 0);

        drop(hub.subscribe(id));
        assert_eq!(hub.publish(id, ConversationEvent::MessagesRemoved(Vec::new())), 0);
        assert!(hub.channels().is_empty());
    }

    #[test]
    fn closed_sessions_release_their_channels() {
        let hub = EventHub::new();
        for _ in 0..1000 {
            let id = Uuid::new_v4();
            drop(hub.subscribe(id));
            hub.unsubscribe(id);
        }
        assert!(hub.channels().is_empty());
    }

    #[test]
    fn channels_with_listeners_survive_unsubscribe() {
        let hub = EventHub::new();
        let id = Uuid::new_v4();
        let _watching = hub.subscribe(id);
        drop(hub.subscribe(id));
        hub.unsubscribe(id);
        assert_eq!(hub.channels().len(), 1);
        assert_eq!(hub.publish(id, ConversationEvent::MessagesRemoved(Vec::new())), 1);
    }
}
