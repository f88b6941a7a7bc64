//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for live conversation views: typing reveals, audio playback and dictation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::web::rest::MessageResponse;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: Dictation audio is sent as raw Binary frames (16-bit mono PCM) between
// `DictationStarted` and `DictationEnded`, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens a live view of a conversation. This must be the first message sent.
    Init { conversation_id: Uuid },

    /// Asks for a message to be revealed with the typing effect.
    Reveal { message_id: Uuid },

    /// The play/pause button of a message was pressed.
    ToggleAudio { message_id: Uuid },

    PauseAudio,

    ResumeAudio,

    /// The client finished playing the clip of a message.
    AudioEnded { message_id: Uuid },

    /// Asks for the audio of a message as a downloadable data URI.
    DownloadAudio { message_id: Uuid },

    /// The user started speaking into the microphone.
    DictationStarted,

    /// The user stopped speaking. The buffered audio should be transcribed.
    DictationEnded,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================
// NOTE: Synthesized speech is sent as a raw Binary frame right after
// `AudioPlay`, which tells the client which message it belongs to.
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms that the session follows the given conversation.
    SessionInitialized { conversation_id: Uuid },

    MessageAdded { message: MessageResponse },

    MessageUpdated { message: MessageResponse },

    MessagesRemoved { message_ids: Vec<Uuid> },

    /// A reply is being generated; show a placeholder until it is cleared.
    ThinkingStarted { placeholder_id: Uuid },

    ThinkingCleared { placeholder_id: Uuid },

    /// One frame of a typing reveal. `text` carries the cursor until `done`.
    Typing { message_id: Uuid, text: String, done: bool },

    AudioLoading { message_id: Uuid },

    AudioPlay { message_id: Uuid, mime_type: String },

    AudioPause { message_id: Uuid },

    AudioResume { message_id: Uuid },

    AudioStop { message_id: Uuid },

    AudioDownload { message_id: Uuid, audio_data_uri: String },

    /// Result of a dictation.
    Transcription { text: String },

    /// Reports an error to the client, which should display the message.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_in_snake_case() {
        let id = Uuid::new_v4();
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "toggle_audio", "message_id": id })).unwrap();
        assert_eq!(msg, ClientMessage::ToggleAudio { message_id: id });

        let msg: ClientMessage = serde_json::from_value(json!({ "type": "pause_audio" })).unwrap();
        assert_eq!(msg, ClientMessage::PauseAudio);

        assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "shout" })).is_err());
    }

    #[test]
    fn server_messages_carry_their_type() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(ServerMessage::Typing {
            message_id: id,
            text: "Hel▋".to_string(),
            done: false,
        })
        .unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["text"], "Hel▋");
        assert_eq!(value["done"], false);

        let value = serde_json::to_value(ServerMessage::AudioStop { message_id: id }).unwrap();
        assert_eq!(value, json!({ "type": "audio_stop", "message_id": id }));
    }
}
