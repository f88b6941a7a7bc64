//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use crate::web::events::EventHub;
use progress_core::audio::{AudioCommand, AudioCoordinator};
use progress_core::data_uri::DataUri;
use progress_core::domain::FeedbackRating;
use progress_core::gate::InFlightGate;
use progress_core::ports::{
    ChatModelService, DatabaseService, DocumentSummaryService, ImageGenerationService, Mailer,
    SpeechToTextService, TextToSpeechService, TitleGenerationService,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Minimum gap between two submissions of the same rating by one user.
pub const FEEDBACK_COOLDOWN: Duration = Duration::from_secs(1);

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub chat_adapter: Arc<dyn ChatModelService>,
    pub title_adapter: Arc<dyn TitleGenerationService>,
    pub summary_adapter: Arc<dyn DocumentSummaryService>,
    pub stt_adapter: Arc<dyn SpeechToTextService>,
    pub tts_adapter: Arc<dyn TextToSpeechService>,
    pub image_adapter: Arc<dyn ImageGenerationService>,
    pub mailer: Arc<dyn Mailer>,
    pub events: Arc<EventHub>,
    /// One reply generation per conversation at a time.
    pub generation_gate: InFlightGate<Uuid>,
    pub feedback_gate: InFlightGate<(Uuid, FeedbackRating)>,
}

//=========================================================================================
// SessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// How a `download_audio` request is served.
#[derive(Debug, PartialEq)]
pub enum DownloadPlan {
    /// The audio is cached; send it as this data URI.
    Ready(String),
    /// Speech for the message is already being synthesized. The download
    /// follows when it arrives.
    Pending,
    /// Carry out these commands; the download follows the synthesized audio.
    Synthesize(Vec<AudioCommand>),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DictationChunk {
    Buffered,
    /// No dictation is running; the audio is ignored.
    NotDictating,
    /// The recording outgrew the limit and was discarded.
    TooLong,
}

/// The state for a single, active WebSocket connection.
pub struct SessionState {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    /// Preferred voice from the user's profile, if one is stored.
    pub voice: Option<String>,
    pub audio: AudioCoordinator,
    /// Message whose audio should be offered as a download once synthesized.
    pub pending_download: Option<Uuid>,
    /// Raw PCM collected between `dictation_started` and `dictation_ended`.
    pub dictation: Option<Vec<u8>>,
    /// Cancels the typing reveal currently running, if any.
    pub typing_token: CancellationToken,
}

impl SessionState {
    pub fn new(user_id: Uuid, conversation_id: Uuid, voice: Option<String>) -> Self {
        Self {
            user_id,
            conversation_id,
            voice,
            audio: AudioCoordinator::new(),
            pending_download: None,
            dictation: None,
            typing_token: CancellationToken::new(),
        }
    }

    /// Cancels any running reveal and hands out the token for the next one.
    pub fn restart_typing(&mut self) -> CancellationToken {
        self.typing_token.cancel();
        self.typing_token = CancellationToken::new();
        self.typing_token.clone()
    }

    pub fn request_download(&mut self, message_id: Uuid) -> DownloadPlan {
        if let Some(clip) = self.audio.cached_audio(message_id) {
            return DownloadPlan::Ready(DataUri::encode(&clip.mime_type, &clip.bytes));
        }
        self.pending_download = Some(message_id);
        if self.audio.is_loading(message_id) {
            return DownloadPlan::Pending;
        }
        DownloadPlan::Synthesize(self.audio.load(message_id))
    }

    /// True, once, if a download was waiting for the audio of `message_id`.
    pub fn take_pending_download(&mut self, message_id: Uuid) -> bool {
        if self.pending_download == Some(message_id) {
            self.pending_download = None;
            true
        } else {
            false
        }
    }

    /// Buffers one frame of dictation audio, keeping the recording under `limit` bytes.
    pub fn push_dictation(&mut self, chunk: &[u8], limit: usize) -> DictationChunk {
        let Some(buffer) = self.dictation.as_mut() else {
            return DictationChunk::NotDictating;
        };
        if buffer.len() + chunk.len() > limit {
            self.dictation = None;
            return DictationChunk::TooLong;
        }
        buffer.extend_from_slice(chunk);
        DictationChunk::Buffered
    }
}
